mod lock;
mod number;
mod serialize;
mod unique;

pub use lock::HandyRwLock;
pub use number::ceil_div;
pub use serialize::{
    read_u32_aligned, read_u32_be, write_u32_aligned, write_u32_be,
};
pub use unique::Unique;
