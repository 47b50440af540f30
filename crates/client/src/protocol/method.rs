//! The table of request verbs the client knows how to issue.
//!
//! Besides the plain HTTP verbs the table carries the WebDAV extensions. Each
//! entry knows its canonical wire spelling, a stable identifier string and the
//! RFC range that defines it.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

macro_rules! http_methods {
    ($( $variant:ident => ($id:literal, $verb:literal, $first_rfc:literal, $last_rfc:expr) ),+ $(,)?) => {
        /// A request verb.
        ///
        /// The discriminant doubles as the index into the method table, so
        /// `HttpMethod::by_index(m.index()) == Some(m)` for every method.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum HttpMethod {
            $( $variant, )+
        }

        impl HttpMethod {
            const ALL: &'static [HttpMethod] = &[ $( HttpMethod::$variant, )+ ];

            /// Canonical uppercase spelling used on the wire.
            pub const fn verb(self) -> &'static str {
                match self {
                    $( HttpMethod::$variant => $verb, )+
                }
            }

            /// Stable identifier, e.g. `http_get` or `webdav_copy`.
            pub const fn id_str(self) -> &'static str {
                match self {
                    $( HttpMethod::$variant => $id, )+
                }
            }

            /// The first RFC that defined this verb.
            pub const fn first_rfc(self) -> u16 {
                match self {
                    $( HttpMethod::$variant => $first_rfc, )+
                }
            }

            /// The last RFC in which this verb appears, if it has been retired.
            pub const fn last_rfc(self) -> Option<u16> {
                match self {
                    $( HttpMethod::$variant => $last_rfc, )+
                }
            }
        }
    };
}

http_methods! {
    Get => ("http_get", "GET", 1945, None),
    Put => ("http_put", "PUT", 1945, None),
    Post => ("http_post", "POST", 1945, None),
    Options => ("http_options", "OPTIONS", 1945, None),
    Head => ("http_head", "HEAD", 1945, None),
    Delete => ("http_delete", "DELETE", 1945, None),
    Trace => ("http_trace", "TRACE", 2616, None),
    Connect => ("http_connect", "CONNECT", 2616, None),
    Link => ("http_link", "LINK", 1945, None),
    Unlink => ("http_unlink", "UNLINK", 1945, None),
    Patch => ("http_patch", "PATCH", 5789, None),
    PropFind => ("webdav_propfind", "PROPFIND", 2518, None),
    PropPatch => ("webdav_proppatch", "PROPPATCH", 2518, None),
    MkCol => ("webdav_mkcol", "MKCOL", 2518, None),
    Copy => ("webdav_copy", "COPY", 2518, None),
    Move => ("webdav_move", "MOVE", 2518, None),
    Lock => ("webdav_lock", "LOCK", 2518, None),
    Unlock => ("webdav_unlock", "UNLOCK", 2518, None),
}

impl HttpMethod {
    pub const fn count() -> usize {
        Self::ALL.len()
    }

    pub fn by_index(index: usize) -> Option<HttpMethod> {
        Self::ALL.get(index).copied()
    }

    /// Identity lookup, kept so callers that store methods by id can round trip.
    pub fn by_id(id: HttpMethod) -> Option<HttpMethod> {
        Self::by_index(id.index())
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Case-insensitive lookup by verb, accepting an optional `http_` or
    /// `webdav_` prefix. Empty or unknown names yield `None`.
    pub fn by_name(name: &str) -> Option<HttpMethod> {
        if name.is_empty() {
            return None;
        }
        let normalized = name.to_ascii_lowercase();
        let bare = normalized
            .strip_prefix("http_")
            .or_else(|| normalized.strip_prefix("webdav_"))
            .unwrap_or(&normalized);

        Self::ALL.iter().copied().find(|method| method.verb().eq_ignore_ascii_case(bare))
    }

    pub fn iter() -> impl Iterator<Item = HttpMethod> {
        Self::ALL.iter().copied()
    }

    /// Whether requests with this verb carry a body to upload.
    pub const fn need_body(self) -> bool {
        matches!(
            self,
            HttpMethod::Put | HttpMethod::Post | HttpMethod::Patch | HttpMethod::PropFind | HttpMethod::PropPatch | HttpMethod::Lock
        )
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown http method: {name:?}")]
pub struct UnknownMethod {
    name: String,
}

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::by_name(s).ok_or_else(|| UnknownMethod { name: s.to_owned() })
    }
}

impl TryFrom<HttpMethod> for http::Method {
    type Error = http::method::InvalidMethod;

    fn try_from(method: HttpMethod) -> Result<Self, Self::Error> {
        http::Method::from_bytes(method.verb().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips() {
        assert_eq!(HttpMethod::count(), 18);
        for i in 0..HttpMethod::count() {
            let method = HttpMethod::by_index(i).unwrap();
            assert_eq!(method.index(), i);
            assert_eq!(HttpMethod::by_id(method), Some(method));
            assert_eq!(HttpMethod::by_name(method.verb()), Some(method));
            assert_eq!(HttpMethod::by_name(method.id_str()), Some(method));
            assert_eq!(method.verb().parse::<HttpMethod>(), Ok(method));
        }
        assert_eq!(HttpMethod::iter().count(), HttpMethod::count());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(HttpMethod::by_name("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::by_name("GeT"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::by_name("HTTP_POST"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::by_name("webdav_propfind"), Some(HttpMethod::PropFind));
        assert_eq!(HttpMethod::by_name("proppatch"), Some(HttpMethod::PropPatch));
        assert_eq!(HttpMethod::by_name("unlock"), Some(HttpMethod::Unlock));
        assert_eq!(HttpMethod::by_name("mkcol"), Some(HttpMethod::MkCol));
    }

    #[test]
    fn bad_lookups() {
        assert_eq!(HttpMethod::by_name(""), None);
        assert_eq!(HttpMethod::by_name("gets"), None);
        assert_eq!(HttpMethod::by_name("http_"), None);
        assert_eq!(HttpMethod::by_name("pickle"), None);
        assert_eq!(HttpMethod::by_index(HttpMethod::count()), None);
        assert_eq!("bogus".parse::<HttpMethod>(), Err(UnknownMethod { name: "bogus".to_owned() }));
    }

    #[test]
    fn metadata() {
        assert_eq!(HttpMethod::Patch.first_rfc(), 5789);
        assert_eq!(HttpMethod::Trace.first_rfc(), 2616);
        assert_eq!(HttpMethod::Copy.first_rfc(), 2518);
        assert_eq!(HttpMethod::Get.last_rfc(), None);
        assert_eq!(HttpMethod::Copy.id_str(), "webdav_copy");
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
        assert!(HttpMethod::Post.need_body());
        assert!(!HttpMethod::Get.need_body());
    }

    #[test]
    fn into_http_method() {
        assert_eq!(http::Method::try_from(HttpMethod::Get).unwrap(), http::Method::GET);
        assert_eq!(http::Method::try_from(HttpMethod::MkCol).unwrap().as_str(), "MKCOL");
    }
}
