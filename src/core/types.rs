use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use super::rules::RuleSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Priorities {
    pub cash: u8,
    pub pension: u8,
    pub funds: u8,
    pub trusts: u8,
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            cash: 1,
            funds: 2,
            trusts: 3,
            pension: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Parameters {
    pub start_age: u32,
    pub target_age: u32,
    pub retirement_age: u32,
    pub married: bool,
    pub partner_start_age: Option<u32>,

    pub initial_cash: f64,
    pub initial_pension: f64,
    pub initial_partner_pension: f64,
    pub initial_funds: f64,
    pub initial_trusts: f64,

    pub emergency_stash: f64,
    pub fund_allocation: f64,
    pub trust_allocation: f64,
    pub pension_contribution_fraction: f64,
    pub take_lump_sum: bool,

    pub pension_return_mean: f64,
    pub pension_return_stdev: f64,
    pub fund_return_mean: f64,
    pub fund_return_stdev: f64,
    pub trust_return_mean: f64,
    pub trust_return_stdev: f64,
    pub inflation: f64,
    pub cash_interest_rate: f64,

    pub state_pension_weekly: f64,
    pub priorities: Priorities,

    pub monte_carlo_trials: u32,
    pub seed: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            start_age: 30,
            target_age: 90,
            retirement_age: 65,
            married: false,
            partner_start_age: None,
            initial_cash: 0.0,
            initial_pension: 0.0,
            initial_partner_pension: 0.0,
            initial_funds: 0.0,
            initial_trusts: 0.0,
            emergency_stash: 10_000.0,
            fund_allocation: 0.5,
            trust_allocation: 0.5,
            pension_contribution_fraction: 1.0,
            take_lump_sum: true,
            pension_return_mean: 0.05,
            pension_return_stdev: 0.0,
            fund_return_mean: 0.05,
            fund_return_stdev: 0.0,
            trust_return_mean: 0.05,
            trust_return_stdev: 0.0,
            inflation: 0.02,
            cash_interest_rate: 0.0,
            state_pension_weekly: 289.30,
            priorities: Priorities::default(),
            monte_carlo_trials: 5_000,
            seed: 42,
        }
    }
}

impl Parameters {
    pub fn partner_age_at(&self, year: u32) -> Option<u32> {
        if !self.married {
            return None;
        }
        Some(self.partner_start_age.unwrap_or(self.start_age) + year)
    }

    pub fn is_deterministic(&self) -> bool {
        self.pension_return_stdev == 0.0
            && self.fund_return_stdev == 0.0
            && self.trust_return_stdev == 0.0
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_age < self.start_age {
            return Err(ConfigError::InvalidAgeRange(format!(
                "targetAge ({}) must be >= startAge ({})",
                self.target_age, self.start_age
            )));
        }

        for (asset, value) in [
            ("cash", self.priorities.cash),
            ("pension", self.priorities.pension),
            ("funds", self.priorities.funds),
            ("trusts", self.priorities.trusts),
        ] {
            if value > 4 {
                return Err(ConfigError::InvalidPriority { asset, value });
            }
        }

        for (name, value) in [
            ("fundAllocation", self.fund_allocation),
            ("trustAllocation", self.trust_allocation),
            ("pensionContributionFraction", self.pension_contribution_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange {
                    name: name.to_string(),
                    value,
                });
            }
        }
        if self.fund_allocation + self.trust_allocation > 1.0 + 1e-9 {
            return Err(ConfigError::RateOutOfRange {
                name: "fundAllocation + trustAllocation".to_string(),
                value: self.fund_allocation + self.trust_allocation,
            });
        }

        for (name, value) in [
            ("initialCash", self.initial_cash),
            ("initialPension", self.initial_pension),
            ("initialPartnerPension", self.initial_partner_pension),
            ("initialFunds", self.initial_funds),
            ("initialTrusts", self.initial_trusts),
            ("emergencyStash", self.emergency_stash),
            ("pensionReturnStdev", self.pension_return_stdev),
            ("fundReturnStdev", self.fund_return_stdev),
            ("trustReturnStdev", self.trust_return_stdev),
            ("statePensionWeekly", self.state_pension_weekly),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeValue {
                    name: name.to_string(),
                    value,
                });
            }
        }

        if !self.is_deterministic() && self.monte_carlo_trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "SI")]
    Salary,
    #[serde(rename = "SInp")]
    SalaryNoPension,
    #[serde(rename = "SI2")]
    PartnerSalary,
    #[serde(rename = "SI2np")]
    PartnerSalaryNoPension,
    #[serde(rename = "UI")]
    Rsu,
    #[serde(rename = "RI")]
    Rental,
    #[serde(rename = "DBI")]
    DefinedBenefit,
    #[serde(rename = "FI")]
    TaxFree,
    #[serde(rename = "E")]
    Expense,
    #[serde(rename = "R")]
    RealEstate,
    #[serde(rename = "M")]
    Mortgage,
    #[serde(rename = "SM")]
    MarketOverride,
    #[serde(rename = "MV")]
    Relocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub amount: f64,
    pub from_age: u32,
    #[serde(default)]
    pub to_age: Option<u32>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub match_rate: Option<f64>,
}

impl SimEvent {
    pub fn last_age(&self) -> u32 {
        self.to_age.unwrap_or(self.from_age)
    }

    pub fn is_active(&self, age: u32) -> bool {
        self.from_age <= age && age <= self.last_age()
    }

    pub fn amount_at(&self, age: u32, inflation: f64) -> f64 {
        let years = age.saturating_sub(self.from_age) as i32;
        self.amount * (1.0 + self.rate.unwrap_or(inflation)).powi(years)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: &str| ConfigError::InvalidEvent {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.last_age() < self.from_age {
            return Err(invalid("toAge must be >= fromAge"));
        }
        if !self.amount.is_finite() {
            return Err(invalid("amount must be finite"));
        }
        match self.kind {
            EventKind::RealEstate | EventKind::Mortgage if self.id.is_empty() => {
                Err(invalid("property events need an id"))
            }
            EventKind::MarketOverride if self.rate.is_none() => {
                Err(invalid("market override needs a rate"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scenario {
    pub parameters: Parameters,
    pub events: Vec<SimEvent>,
    pub rules: Option<RuleSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub age: u32,
    pub salaries: f64,
    pub rsu_income: f64,
    pub rental_income: f64,
    pub defined_benefit: f64,
    pub tax_free_income: f64,
    pub private_pension: f64,
    pub state_pension: f64,
    pub lump_sum: f64,
    pub investment_income: f64,
    pub fund_sales: f64,
    pub trust_sales: f64,
    pub cash_withdrawn: f64,
    pub realized_gains: f64,
    pub income_tax: f64,
    pub prsi: f64,
    pub usc: f64,
    pub cgt: f64,
    pub net_income: f64,
    pub expenses: f64,
    pub pension_contribution: f64,
    pub property_purchases: f64,
    pub pension_capital: f64,
    pub partner_pension_capital: f64,
    pub fund_capital: f64,
    pub trust_capital: f64,
    pub real_estate_capital: f64,
    pub cash: f64,
    pub worth: f64,
    pub unresolved_deficit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub age: u32,
    pub mean_net_income: f64,
    pub mean_expenses: f64,
    pub mean_cash: f64,
    pub mean_worth: f64,
    pub median_worth: f64,
    pub p10_worth: f64,
    pub p90_worth: f64,
    pub deficit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicResult {
    pub success: bool,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloSummary {
    pub success_rate: f64,
    pub trials: u32,
    pub aggregates: Vec<AggregateRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ProjectionOutcome {
    Deterministic(DeterministicResult),
    MonteCarlo(MonteCarloSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_parse_from_short_codes() {
        let json = r#"[
            {"type": "SI", "id": "job", "amount": 60000, "fromAge": 30, "toAge": 64, "rate": 0.03, "matchRate": 0.05},
            {"type": "E", "id": "car", "amount": 20000, "fromAge": 40},
            {"type": "SM", "fromAge": 50, "toAge": 51, "rate": -0.4}
        ]"#;
        let events: Vec<SimEvent> = serde_json::from_str(json).expect("valid events");
        assert_eq!(events[0].kind, EventKind::Salary);
        assert_eq!(events[0].match_rate, Some(0.05));
        assert_eq!(events[1].kind, EventKind::Expense);
        assert_eq!(events[1].last_age(), 40);
        assert_eq!(events[2].kind, EventKind::MarketOverride);
        assert!(events[2].id.is_empty());
    }

    #[test]
    fn event_activity_is_inclusive() {
        let event = SimEvent {
            kind: EventKind::Rental,
            id: "flat".to_string(),
            amount: 1_000.0,
            from_age: 40,
            to_age: Some(42),
            rate: None,
            match_rate: None,
        };
        assert!(!event.is_active(39));
        assert!(event.is_active(40));
        assert!(event.is_active(42));
        assert!(!event.is_active(43));
    }

    #[test]
    fn amount_grows_at_event_rate_or_inflation() {
        let mut event = SimEvent {
            kind: EventKind::Salary,
            id: "job".to_string(),
            amount: 1_000.0,
            from_age: 30,
            to_age: Some(40),
            rate: Some(0.10),
            match_rate: None,
        };
        assert!((event.amount_at(32, 0.02) - 1_210.0).abs() < 1e-9);
        event.rate = None;
        assert!((event.amount_at(31, 0.02) - 1_020.0).abs() < 1e-9);
    }

    #[test]
    fn parameters_reject_out_of_range_priority() {
        let mut params = Parameters::default();
        params.priorities.trusts = 5;
        let err = params.validate().expect_err("priority 5 is invalid");
        assert!(matches!(
            err,
            ConfigError::InvalidPriority {
                asset: "trusts",
                value: 5
            }
        ));
    }

    #[test]
    fn parameters_reject_inverted_age_range() {
        let params = Parameters {
            start_age: 60,
            target_age: 50,
            ..Parameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidAgeRange(_))
        ));
    }

    #[test]
    fn parameters_accept_single_year_and_retired_start() {
        let single_year = Parameters {
            start_age: 70,
            target_age: 70,
            ..Parameters::default()
        };
        assert!(single_year.validate().is_ok());

        let retired = Parameters {
            start_age: 70,
            target_age: 90,
            retirement_age: 65,
            ..Parameters::default()
        };
        assert!(retired.validate().is_ok());
    }

    #[test]
    fn partner_age_tracks_own_start_age_when_married() {
        let mut params = Parameters {
            start_age: 40,
            partner_start_age: Some(35),
            ..Parameters::default()
        };
        assert_eq!(params.partner_age_at(3), None);
        params.married = true;
        assert_eq!(params.partner_age_at(3), Some(38));
        params.partner_start_age = None;
        assert_eq!(params.partner_age_at(0), Some(40));
    }

    #[test]
    fn parameters_reject_over_allocation() {
        let params = Parameters {
            fund_allocation: 0.7,
            trust_allocation: 0.6,
            ..Parameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn outcome_serializes_with_mode_tag() {
        let outcome = ProjectionOutcome::MonteCarlo(MonteCarloSummary {
            success_rate: 0.9,
            trials: 10,
            aggregates: Vec::new(),
        });
        let json = serde_json::to_value(&outcome).expect("serializable");
        assert_eq!(json["mode"], "monteCarlo");
        assert_eq!(json["successRate"], 0.9);
    }
}
