// Endpoint descriptors and the backend operation catalog

use reqwest::{Method, Url};

use crate::error::ApiError;

const ACCEPT_JSON: (&str, &str) = ("Accept", "application/json");

/// Static description of how to reach and authorize one backend operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: String,
    method: Method,
    requires_auth: bool,
    headers: Vec<(String, String)>,
}

impl Endpoint {
    /// Authorized endpoint accepting JSON
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            requires_auth: true,
            headers: vec![(ACCEPT_JSON.0.to_string(), ACCEPT_JSON.1.to_string())],
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Mark the endpoint as reachable without a bearer token
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Replace the static headers
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Append percent-encoded query pairs; an empty list leaves the endpoint unchanged
    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = encode_query(pairs);
        if encoded.is_empty() {
            return self;
        }
        let separator = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!("{}{}{}", self.path, separator, encoded);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Absolute URL of this endpoint under `base`
    pub fn url(&self, base: &Url) -> Result<Url, ApiError> {
        base.join(&self.path).map_err(|e| {
            ApiError::Configuration(format!("Invalid endpoint path '{}': {}", self.path, e))
        })
    }
}

fn encode_query<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let Ok(mut scratch) = Url::parse("http://localhost/") else {
        return String::new();
    };
    scratch.query_pairs_mut().extend_pairs(pairs);
    scratch.query().unwrap_or_default().to_string()
}

/// Authentication operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEndpoint {
    Login,
    Register,
}

impl AuthEndpoint {
    pub fn endpoint(&self) -> Endpoint {
        let path = match self {
            AuthEndpoint::Login => "api/v1/auth/login",
            AuthEndpoint::Register => "api/v1/auth/register",
        };
        Endpoint::post(path).public()
    }
}

/// Reference data lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEndpoint {
    Categories,
    Locations,
    Statuses,
}

impl CatalogEndpoint {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            CatalogEndpoint::Categories => Endpoint::get("api/v1/category/all"),
            CatalogEndpoint::Locations => Endpoint::get("api/v1/location/all"),
            CatalogEndpoint::Statuses => Endpoint::get("api/v1/status/all"),
        }
    }
}

/// User profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileEndpoint {
    User { id: i64 },
}

impl ProfileEndpoint {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ProfileEndpoint::User { id } => Endpoint::get(format!("api/v1/user/{}", id)),
        }
    }
}

/// Item search filter; ids of `-1` mean "any"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub item_name: Option<String>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub seller_id: Option<i64>,
}

impl SearchFilter {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(name) = &self.item_name {
            pairs.push(("itemName", name.clone()));
        }
        if let Some(id) = self.category_id.filter(|id| *id != -1) {
            pairs.push(("categoryId", id.to_string()));
        }
        if let Some(id) = self.location_id.filter(|id| *id != -1) {
            pairs.push(("locationId", id.to_string()));
        }
        if let Some(id) = self.seller_id {
            pairs.push(("sellerId", id.to_string()));
        }
        pairs
    }
}

/// Item listing and image operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEndpoint {
    Save,
    Update,
    UploadImage,
    UpdateImage,
    FetchImage { item_id: i64 },
    Search { page: u32, filter: SearchFilter },
}

impl ItemEndpoint {
    pub fn endpoint(&self) -> Endpoint {
        let multipart = [("Accept", "*/*"), ("Content-Type", "multipart/form-data")];
        match self {
            ItemEndpoint::Save => Endpoint::post("api/v1/item/create"),
            ItemEndpoint::Update => Endpoint::post("api/v1/item/update"),
            ItemEndpoint::UploadImage => Endpoint::post("api/v1/objects").with_headers(multipart),
            ItemEndpoint::UpdateImage => {
                Endpoint::post("api/v1/objects/update").with_headers(multipart)
            }
            ItemEndpoint::FetchImage { item_id } => Endpoint::get("api/v1/objects/download")
                .with_headers(Vec::<(String, String)>::new())
                .with_query([("itemId", item_id.to_string())]),
            ItemEndpoint::Search { page, filter } => {
                let mut pairs = filter.query_pairs();
                pairs.push(("page", page.to_string()));
                Endpoint::get("api/v1/item/search").with_query(pairs)
            }
        }
    }
}

/// Chat operations (all POST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEndpoint {
    CreateChat,
    SendMessage,
    GetMessages,
    GetChats,
}

impl ChatEndpoint {
    pub fn endpoint(&self) -> Endpoint {
        let path = match self {
            ChatEndpoint::CreateChat => "chat/create_chat",
            ChatEndpoint::SendMessage => "chat/send_message",
            ChatEndpoint::GetMessages => "chat/get_messages",
            ChatEndpoint::GetChats => "chat/get_chats",
        };
        Endpoint::post(path)
    }
}

macro_rules! impl_into_endpoint {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Endpoint {
            fn from(value: $ty) -> Self {
                value.endpoint()
            }
        })*
    };
}

impl_into_endpoint!(AuthEndpoint, CatalogEndpoint, ProfileEndpoint, ItemEndpoint, ChatEndpoint);
