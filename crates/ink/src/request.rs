use std::collections::HashMap;

use ink_core::Url;
use ink_notices::ActorId;
use serde_json::Value;

use crate::notices::NoticeView;

/// Which part of the host a request was made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Back-office pages.
    Admin,
    /// Public pages.
    Front,
    /// Asynchronous calls from a rendered page.
    Background,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub logged_in: bool,
    pub administrator: bool,
}

impl Capabilities {
    #[must_use]
    pub fn administrator() -> Self {
        Self {
            logged_in: true,
            administrator: true,
        }
    }

    #[must_use]
    pub fn member() -> Self {
        Self {
            logged_in: true,
            administrator: false,
        }
    }
}

/// Terminal answer set by a trigger. Once present, no further trigger runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Redirect(Url),
    Halt { status: u16, message: String },
    Json(Value),
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub area: Area,
    pub url: Url,
    pub actor: Option<ActorId>,
    pub capabilities: Capabilities,
    pub screen: Option<String>,
    pub params: HashMap<String, String>,
    /// Filled by the notices trigger for the host to render.
    pub notices: Vec<NoticeView>,
    response: Option<Response>,
}

impl RequestContext {
    /// Anonymous request to `url`; query parameters become [`params`].
    ///
    /// [`params`]: Self::params
    pub fn new(area: Area, url: Url) -> Self {
        let params = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self {
            area,
            url,
            actor: None,
            capabilities: Capabilities::default(),
            screen: None,
            params,
            notices: Vec::new(),
            response: None,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: ActorId, capabilities: Capabilities) -> Self {
        self.actor = Some(actor);
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_screen(mut self, screen: impl Into<String>) -> Self {
        self.screen = Some(screen.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Logged in and allowed to administer the installation.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.capabilities.logged_in && self.capabilities.administrator
    }

    pub fn respond(&mut self, response: Response) {
        self.response = Some(response);
    }

    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}
