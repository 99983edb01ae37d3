//! Draft editing over remote collections.
//!
//! Each editor keeps the last loaded snapshot next to a working copy and
//! reports unsaved changes by comparing the two.

mod collection;
mod debounce;
mod fields;
mod singleton;

pub use collection::CollectionEditor;
pub use debounce::Debouncer;
pub use fields::{apply_fields, parse_assignments};
pub use singleton::SingletonEditor;
