//! Tern core: identifiers, call params, query matching, pagination and errors.

pub mod error;
pub mod id;
pub mod method;
pub mod pagination;
pub mod params;
pub mod payload;
pub mod query;

pub use error::{ServiceError, ServiceResult};
pub use id::Id;
pub use method::{Method, Methods};
pub use pagination::{FindResult, Page};
pub use params::{Paginate, PaginateConfig, Params, Query};
pub use payload::Payload;
pub use query::{Criteria, Filters, ParsedQuery, SortDirection};
