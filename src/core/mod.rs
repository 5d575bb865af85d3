pub mod error;
pub mod object_id;
pub mod value;

pub use error::{DUPLICATE_KEY_CODE, StoreError, StoreResult};
pub use object_id::{OBJECT_ID_HEX_LEN, ObjectId};
pub use value::{Document, KEY_FIELD, Value, document_from_json, document_into_json, lookup_path};
