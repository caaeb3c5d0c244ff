//! Request verbs.

use std::fmt;

/// Verb of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `DELETE`
    Delete,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
}

impl Method {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Delete => "DELETE",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }

    /// Whether sending the request twice has the effect of sending it once.
    ///
    /// Requests with other verbs are only retried on explicit opt-in.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Post | Self::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
            Method::Delete => Self::DELETE,
            Method::Put => Self::PUT,
            Method::Post => Self::POST,
            Method::Patch => Self::PATCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Method; 7] = [
        Method::Get,
        Method::Head,
        Method::Options,
        Method::Delete,
        Method::Put,
        Method::Post,
        Method::Patch,
    ];

    #[test]
    fn wire_names_match_http() {
        for method in ALL {
            assert_eq!(method.to_string(), http::Method::from(method).as_str());
        }
    }

    #[test]
    fn only_post_and_patch_are_not_idempotent() {
        let not_idempotent: Vec<_> =
            ALL.into_iter().filter(|method| !method.is_idempotent()).collect();
        assert_eq!(not_idempotent, [Method::Post, Method::Patch]);
    }
}
