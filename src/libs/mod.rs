pub mod bitpack;
pub mod bittab;
pub mod contfinder;
pub mod io;
pub mod pqueue;
pub mod reads;
pub mod suffix;
pub mod twobit;
