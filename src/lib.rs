// Raisket Engine - Core Library
// Product normalization, institution resolution, ratings, calculators.
// Exposes all modules for use in CLI, API server, and tests

pub mod calculators;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod fields;
pub mod import;
pub mod logging;
pub mod normalizer;
pub mod ratings;
pub mod resolver;

// Re-export commonly used types
pub use calculators::{
    amortization_schedule, amortize, compute_bonus, compute_bonus_today, project,
    BonusParameters, BonusQuote, CompoundInterestParameters, Installment, LoanParameters,
    LoanQuote, YearSnapshot, MAX_PROJECTION_YEARS, MAX_SCHEDULE_YEARS,
};
pub use config::EngineConfig;
pub use db::{get_events_for_entity, insert_event, setup_database, Event, SqliteStore};
pub use entities::{
    CanonicalProduct, Institution, ModerationAction, NewReview, ProductCategory, RatingSummary,
    Review, ReviewStatus, Segment,
};
pub use error::{EngineError, Result, RowRejection};
pub use fields::{
    generate_slug, parse_array_field, parse_interest_rate, parse_loan_term, parse_numeric_value,
    parse_pipe_list, RateRange, TermRange,
};
pub use import::{
    load_relational, load_rows, ImportReport, ImportRun, ProductStore, RowError, StoredProduct,
};
pub use normalizer::{
    metadata_entry, normalize, NormalizeContext, RawImportRow, RawProduct, RelationalProduct,
};
pub use ratings::{reconcile, reconcile_all, ReconcileReport, ReviewOutcome, ReviewService, ReviewStore};
pub use resolver::{resolve, InstitutionCache, InstitutionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
