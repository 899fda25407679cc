// Domain-layer modules and shared errors/models
pub mod cnpj {
    pub use crate::cnpj::*;
}

pub mod enrichment {
    pub use crate::enrichment::*;
}

pub mod lookup_client {
    pub use crate::lookup_client::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
