//! Piece codec: Reed-Solomon erasure coding plus Twofish-CTR encryption of
//! individual pieces.

mod crypto;
mod erasure;

pub use crypto::{decrypt, encrypt};
pub use erasure::{PieceCodec, Shard};
