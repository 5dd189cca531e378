pub mod bug;
pub mod dbg;
pub mod index;
