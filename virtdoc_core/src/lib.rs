pub mod codec;
pub mod comparator;
pub mod resource;
pub mod units;

pub use codec::{decode, encode, DocumentCodec};
pub use comparator::{compare, Comparison, Divergence, DivergenceCause, SemanticComparator};
pub use resource::{ChangeDetector, DecodedResource};
pub use units::{to_bytes, UnitTable};
