//! Console output.
//!
//! With `std`, messages go to stdout.  With `defmt`, they go to whatever
//! transport the board links in.  Otherwise they vanish, but the arguments are
//! still evaluated so that nothing becomes unused.

#[cfg(feature = "std")]
macro_rules! info {
    ($($arg:tt)+) => { std::println!($($arg)+) };
}
#[cfg(feature = "std")]
macro_rules! warn {
    ($($arg:tt)+) => { std::println!($($arg)+) };
}
#[cfg(feature = "std")]
macro_rules! error {
    ($($arg:tt)+) => { std::eprintln!($($arg)+) };
}

#[cfg(all(not(feature = "std"), feature = "defmt"))]
macro_rules! info {
    ($($arg:tt)+) => { defmt::info!($($arg)+) };
}
#[cfg(all(not(feature = "std"), feature = "defmt"))]
macro_rules! warn {
    ($($arg:tt)+) => { defmt::warn!($($arg)+) };
}
#[cfg(all(not(feature = "std"), feature = "defmt"))]
macro_rules! error {
    ($($arg:tt)+) => { defmt::error!($($arg)+) };
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! info {
    ($fmt:literal $(, $e:expr)* $(,)?) => { { $( let _ = &$e; )* } };
}
#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! warn {
    ($fmt:literal $(, $e:expr)* $(,)?) => { { $( let _ = &$e; )* } };
}
#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! error {
    ($fmt:literal $(, $e:expr)* $(,)?) => { { $( let _ = &$e; )* } };
}
