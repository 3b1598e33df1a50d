//! Request identifiers, using the [TypeID spec](https://github.com/jetpack-io/typeid)
//! so a raw id string is self-describing (`req_...`) and carries no secret
//! beyond a UUIDv7: time-sortable, which makes `/healthz`-adjacent log
//! correlation and trace ordering easier than a random v4 would.
//!
//! This is the only id type this crate mints — `RequestId` is the `C2`
//! context carrier that flows through [`crate::context`] and the
//! request-id middleware. A domain embedding this crate is free to mint
//! its own prefixed ids the same way (`"order".create_type_id::<V7>()`)
//! without needing a type here for every entity kind.

use std::fmt;
use std::str::FromStr;

use http::Request;
use mti::prelude::*;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};

/// `req_<base32 uuidv7>`, e.g. `req_01h455vb4pex5vsknk084sn02q`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(MagicTypeId);

impl RequestId {
    pub const PREFIX: &'static str = "req";

    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn prefix(&self) -> &str {
        self.0.prefix().as_str()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    /// Parses and checks the prefix: a `user_...` or otherwise-shaped
    /// TypeID is rejected even though it's a structurally valid TypeID,
    /// since an inbound request-id header under another prefix almost
    /// certainly means a caller forwarded the wrong value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mti = MagicTypeId::from_str(s).map_err(RequestIdError::Parse)?;

        if mti.prefix().as_str() != Self::PREFIX {
            return Err(RequestIdError::InvalidPrefix {
                expected: Self::PREFIX.to_string(),
                actual: mti.prefix().as_str().to_string(),
            });
        }

        Ok(Self(mti))
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestIdError {
    #[error("failed to parse request ID: {0}")]
    Parse(#[from] MagicTypeIdError),
    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix { expected: String, actual: String },
}

/// `tower_http`'s [`MakeRequestId`] glue, for crates that wire request ids
/// through `SetRequestIdLayer` directly instead of going through
/// [`crate::middleware::request_id_middleware`] (which mints `RequestId`s
/// the same way, but also scopes the task-local and handles proxy trust).
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = RequestId::new();
        let header_value = http::HeaderValue::from_str(id.as_str()).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}
