//! Layered, case-insensitive header maps.
//!
//! A [`Headers`] value is a shared handle to one *layer*: an ordered map of
//! header names to values plus an optional parent layer that supplies
//! defaults. Lookups fall through to the parent chain, writes only ever touch
//! the local layer, and enumeration presents a flattened view in which the
//! nearest layer wins.
//!
//! Layers are reference counted, so several sessions or requests can share
//! one set of defaults without copying them.
//!
//! ```
//! use micro_client::{HeaderStatus, Headers};
//!
//! let defaults = Headers::new();
//! defaults.set("User-Agent", "micro-client");
//! defaults.set("Accept", "*/*");
//!
//! let headers = Headers::new();
//! headers.get_defaults_from(&defaults).unwrap();
//! headers.set("accept", "text/html");
//!
//! assert_eq!(headers.get("ACCEPT").as_deref(), Some("text/html"));
//! assert_eq!(headers.contains("user-agent"), HeaderStatus::Inherited);
//! assert_eq!(headers.header_count(), 2);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::{RwLock, RwLockReadGuard};

use crate::ensure;
use crate::protocol::HeaderError;

/// Where a header lookup found its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// Not defined anywhere in the chain.
    Missing,
    /// Defined by an ancestor layer.
    Inherited,
    /// Defined by this layer.
    ExplicitlyDefined,
}

impl HeaderStatus {
    #[inline]
    pub fn is_present(self) -> bool {
        !matches!(self, HeaderStatus::Missing)
    }
}

/// Entries are keyed by the ASCII-lowercased name; the value keeps the
/// spelling the caller used so it can be written back on the wire.
type LayerMap = BTreeMap<String, (String, String)>;

struct Layer {
    map: RwLock<LayerMap>,
    defaults: RwLock<Option<Headers>>,
}

/// A shared, layered header map. Cloning the handle shares the layer.
///
/// Mutation follows a single-writer discipline: `get` and `contains` may be
/// called from any thread, but a layer must not be written concurrently with
/// enumeration of a chain that contains it if a consistent view is needed.
#[derive(Clone)]
pub struct Headers {
    layer: Arc<Layer>,
}

impl Default for Headers {
    fn default() -> Self {
        Self::new()
    }
}

impl Headers {
    pub fn new() -> Self {
        Self { layer: Arc::new(Layer { map: RwLock::new(BTreeMap::new()), defaults: RwLock::new(None) }) }
    }

    /// Returns true if both handles point at the same layer.
    pub fn ptr_eq(&self, other: &Headers) -> bool {
        Arc::ptr_eq(&self.layer, &other.layer)
    }

    /// Looks the header up in this layer, then in each ancestor in turn.
    pub fn get(&self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        let mut current = Some(self.clone());
        while let Some(layer) = current {
            if let Some((_, value)) = layer.layer.map.read().get(&key) {
                return Some(value.clone());
            }
            current = layer.defaults();
        }
        None
    }

    pub fn contains(&self, name: &str) -> HeaderStatus {
        let key = name.to_ascii_lowercase();
        if self.layer.map.read().contains_key(&key) {
            return HeaderStatus::ExplicitlyDefined;
        }
        let mut current = self.defaults();
        while let Some(layer) = current {
            if layer.layer.map.read().contains_key(&key) {
                return HeaderStatus::Inherited;
            }
            current = layer.defaults();
        }
        HeaderStatus::Missing
    }

    /// Sets a header on this layer only. Empty names are ignored.
    pub fn set<N: Into<String>, V: Into<String>>(&self, name: N, value: V) {
        let name = name.into();
        if name.is_empty() {
            return;
        }
        let key = name.to_ascii_lowercase();
        self.layer.map.write().insert(key, (name, value.into()));
    }

    /// Removes a header from this layer only; an inherited value stays visible.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.layer.map.write().remove(&name.to_ascii_lowercase()).map(|(_, value)| value)
    }

    /// True if no layer in the chain defines any header.
    pub fn is_empty(&self) -> bool {
        self.chain().iter().all(|layer| layer.layer.map.read().is_empty())
    }

    pub fn defaults(&self) -> Option<Headers> {
        self.layer.defaults.read().clone()
    }

    /// Makes `other` the parent of this layer.
    ///
    /// Fails with [`HeaderError::CyclicDefaults`] if either layer is already an
    /// ancestor of the other (which includes `other` being `self`). Nothing is
    /// changed on failure.
    pub fn get_defaults_from(&self, other: &Headers) -> Result<(), HeaderError> {
        ensure!(!self.has_in_chain(other), HeaderError::CyclicDefaults);
        ensure!(!other.has_in_chain(self), HeaderError::CyclicDefaults);
        *self.layer.defaults.write() = Some(other.clone());
        Ok(())
    }

    pub fn clear_defaults(&self) -> Option<Headers> {
        self.layer.defaults.write().take()
    }

    /// Number of entries in the flattened view.
    pub fn header_count(&self) -> usize {
        let mut count = 0;
        self.visit_flattened(|_, _| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }

    /// The `index`-th entry of the flattened view.
    pub fn header_by_index(&self, index: usize) -> Option<(String, String)> {
        let mut seen = 0;
        let mut found = None;
        self.visit_flattened(|name, value| {
            if seen == index {
                found = Some((name.to_owned(), value.to_owned()));
                return ControlFlow::Break(());
            }
            seen += 1;
            ControlFlow::Continue(())
        });
        found
    }

    /// The flattened, duplicate-free view of the whole chain.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        self.visit_flattened(|name, value| {
            entries.push((name.to_owned(), value.to_owned()));
            ControlFlow::Continue(())
        });
        entries
    }

    /// Converts the flattened view into an [`http::HeaderMap`].
    pub fn to_header_map(&self) -> Result<HeaderMap, HeaderError> {
        let entries = self.flatten();
        let mut map = HeaderMap::with_capacity(entries.len());
        for (name, value) in entries {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_e| HeaderError::invalid_name(&name))?;
            let header_value = HeaderValue::from_str(&value).map_err(|_e| HeaderError::invalid_value(&name))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }

    /// This layer followed by each ancestor, nearest first.
    fn chain(&self) -> Vec<Headers> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(Headers::defaults) {
            chain.push(parent);
        }
        chain
    }

    fn has_in_chain(&self, other: &Headers) -> bool {
        self.chain().iter().any(|layer| layer.ptr_eq(other))
    }

    /// Walks from the most remote ancestor toward `self`, yielding each entry
    /// that no nearer layer redefines.
    fn visit_flattened<F>(&self, mut f: F)
    where
        F: FnMut(&str, &str) -> ControlFlow<()>,
    {
        let chain = self.chain();
        let maps: Vec<RwLockReadGuard<'_, LayerMap>> = chain.iter().map(|layer| layer.layer.map.read()).collect();

        for depth in (0..maps.len()).rev() {
            for (key, (name, value)) in maps[depth].iter() {
                let masked = maps[..depth].iter().any(|nearer| nearer.contains_key(key));
                if masked {
                    continue;
                }
                if f(name, value).is_break() {
                    return;
                }
            }
        }
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.flatten()).finish()
    }
}
