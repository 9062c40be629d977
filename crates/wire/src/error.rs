/// Wire-layer faults: malformed bytes on a router link.
///
/// These never propagate to the API plane — per the propagation policy, a
/// wire error closes and reconnects the owning link.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("short read: need {needed} bytes, have {available}")]
    ShortRead { needed: usize, available: usize },

    #[error("bad tag byte: {0:#04x}")]
    BadTag(u8),

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("malformed packet: {0}")]
    BadPkt(String),

    #[error("unknown packet type: {0}")]
    UnkType(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
