//! External service integrations.

pub mod crm_client {
    pub use crate::crm_client::*;
}

pub mod oauth {
    pub use crate::oauth::*;
}

pub mod field_mapping {
    pub use crate::field_mapping::*;
}
