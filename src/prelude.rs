pub use crate::filter::Filterable;
pub use crate::score::{FDRComputable, FDRScoreComputable};
