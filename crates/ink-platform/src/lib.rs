mod paths;
mod product;

pub use paths::{AppPaths, AppPathsError};
pub use product::{ProductKind, ProductKindParseError};
