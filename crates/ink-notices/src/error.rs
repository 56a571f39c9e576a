use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoticeError {
    #[error("notice store unavailable: {0}")]
    Store(#[from] ink_store::StoreError),
}
