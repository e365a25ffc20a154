//! Progress autosave: the debounced client controller, the persistence API it
//! talks to, and the server-side store behind that API.

pub mod api;
pub mod buffer;
pub mod record;
pub mod store;

pub use api::{HttpProgressApi, ProgressApi, USER_HEADER};
pub use buffer::{DEFAULT_AUTOSAVE_DELAY, ProgressAutosave};
pub use record::{ProgressRecord, ProgressUpdate, SubjectId};
pub use store::{ANONYMOUS_USER, LocalProgressApi, ProgressStore};
