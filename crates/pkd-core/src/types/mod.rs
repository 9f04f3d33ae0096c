mod certificate;
mod crl;
mod entity;
mod fingerprint;
mod name;
mod progress;
mod record;
mod role;
mod summary;
mod validation;

pub use certificate::*;
pub use crl::*;
pub use entity::*;
pub use fingerprint::*;
pub use name::*;
pub use progress::*;
pub use record::*;
pub use role::*;
pub use summary::*;
pub use validation::*;
