//! Computations over a (filtered) dataset.
//!
//! * [`derived`]      – growth rates, ratios, composites appended as columns
//! * [`aggregate`]    – period grouping with sum / mean reducers
//! * [`relationship`] – masked Pearson correlation and OLS trend line
//! * [`highlights`]   – peaks, latest composition, liquidity breakdown

pub mod aggregate;
pub mod derived;
pub mod highlights;
pub mod relationship;
