/// Data layer: core types, normalization, loading, caching and filtering.
///
/// Architecture:
/// ```text
///  .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  read file → RawTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  schema   │  headers → semantic keys, dates, NaN coercion, total
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  cache    │  canonical Dataset, Arc-shared, explicit reload
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  year / quarter / month predicates → new Dataset
///   └──────────┘
/// ```

pub mod cache;
pub mod filter;
pub mod loader;
pub mod model;
pub mod schema;
