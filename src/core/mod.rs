mod engine;
mod error;
mod holding;
mod property;
mod rules;
mod sampler;
mod solver;
mod tax;
mod types;

pub use engine::{SimulationContext, TrialResult, run, run_projection, simulate_trial};
pub use error::{ConfigError, ConfigResult};
pub use holding::{InvestmentHolding, Portfolio, RetirementPot, TaxTreatmentPolicy, Tranche};
pub use property::Property;
pub use rules::{AgeRate, Band, BandTable, RuleSet, TaxRuleSet, rate_for_age};
pub use sampler::{GrowthSampler, derive_seed};
pub use solver::{
    AssetKind, CONVERGENCE_EPSILON, WithdrawalOutcome, WithdrawalState, resolve_deficit,
    spendable_income,
};
pub use tax::{IncomeKind, TaxFigures, TaxLedger, progressive_tax};
pub use types::{
    AggregateRow, DeterministicResult, EventKind, MonteCarloSummary, Parameters, Priorities,
    ProjectionOutcome, Row, Scenario, SimEvent,
};
