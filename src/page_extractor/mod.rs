//! Page data extraction: parsed HTML in, SEO record out.

pub mod extractors;
pub mod schema;

pub use extractors::{populate_seo_fields, resolve_href};
pub use schema::{
    AnalyticsTags, HreflangEntry, ImageRef, IssueRecord, IssueSeverity, LinkPlacement, LinkRecord,
    PageRecord,
};
