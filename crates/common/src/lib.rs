pub mod hash;
pub mod maglev;
pub mod modulo;
pub mod packet;
pub mod shared;

pub use maglev::MagData;
pub use modulo::ModuloAux;
pub use packet::{classify, L2Protocol, LookupMode};
pub use shared::SharedData;

/// Upper bound on the Maglev lookup-table length `M`.
pub const MAX_M: usize = 10_000;
/// Upper bound on the backend count `N`.
pub const MAX_N: usize = 100;
