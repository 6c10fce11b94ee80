//! Email template system.
//!
//! This module provides:
//! - Versioned templates keyed by (name, language, version)
//! - Sample context derivation from `{{ variable }}` references
//! - Rendering of subject, plain text and HTML bodies, and validation
//! - Memory and PostgreSQL template storage
//!
//! # Example
//!
//! ```ignore
//! let store = TemplateStore::in_memory(AppmailConfig::default());
//!
//! let template = store
//!     .create(
//!         NewTemplate::named("order-shipped")
//!             .subject("Order {{ order.id }} shipped")
//!             .body_text("Your order is on its way via {{ carrier }}")
//!             .body_html("<p>Your order is on its way via {{ carrier }}</p>"),
//!     )
//!     .await?;
//!
//! // {"order": {"id": "ID"}, "carrier": "CARRIER"}
//! println!("{:?}", template.test_context);
//!
//! let current = store.get_current("order-shipped", "en-us").await?;
//! ```

mod backend;
pub mod context;
mod factory;
mod memory_backend;
mod postgres_backend;
mod render;
mod store;
mod types;

pub use backend::TemplateBackend;
pub use context::{build_sample_context, merge_contexts};
pub use factory::create_template_backend;
pub use memory_backend::MemoryTemplateBackend;
pub use postgres_backend::PostgresTemplateBackend;
pub use render::{
    Context, ContextProcessor, Escape, MiniJinjaEngine, Renderer, RequestContext,
    StaticContextProcessor, TemplateEngine,
};
pub use store::{create_template_store, TemplateStore, TemplateValidity};
pub use types::{
    ContentType, EmailTemplate, NewTemplate, RenderError, RenderErrorKind, TemplateError,
    TemplateResult, ValidationErrors, TEMPLATE_HEADER,
};

pub(crate) use types::split_addresses;
