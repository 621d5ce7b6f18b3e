use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::SignalingError;

/// Address of a tracker-style signaling service.
///
/// Only WebSocket endpoints (`ws://`, `wss://`) are accepted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AnnounceEndpoint(Url);

impl AnnounceEndpoint {
    pub fn parse(s: &str) -> Result<Self, SignalingError> {
        let url = Url::parse(s.trim()).map_err(|_| SignalingError::InvalidEndpoint(s.to_string()))?;
        match url.scheme() {
            "ws" | "wss" if url.host_str().is_some() => Ok(Self(url)),
            _ => Err(SignalingError::InvalidEndpoint(s.to_string())),
        }
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for AnnounceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl fmt::Debug for AnnounceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnnounceEndpoint({})", self.0)
    }
}

impl FromStr for AnnounceEndpoint {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a list of endpoint URLs into an ordered, duplicate-free set.
///
/// The first invalid entry aborts the whole parse; a later duplicate is
/// dropped and the first occurrence keeps its position.
pub fn parse_endpoints<I, S>(urls: I) -> Result<Vec<AnnounceEndpoint>, SignalingError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<AnnounceEndpoint> = Vec::new();
    for raw in urls {
        let endpoint = AnnounceEndpoint::parse(raw.as_ref())?;
        if !out.contains(&endpoint) {
            out.push(endpoint);
        }
    }
    Ok(out)
}
