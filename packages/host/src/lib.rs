//! # arbor-host
//!
//! In-memory host for the reconciler. [`MemoryHost`] keeps an element tree
//! the way a display surface would and applies committed output trees to it,
//! touching only what the diff marked dirty. [`to_html`] serialises the
//! resulting tree for inspection.

pub mod html;
pub mod memory_host;

pub use html::{to_html, HtmlOptions};
pub use memory_host::{ElementId, HostElement, HostError, HostResult, HostStats, MemoryHost};
