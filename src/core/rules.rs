use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub from: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandTable(pub Vec<Band>);

impl BandTable {
    pub fn new(bands: &[(f64, f64)]) -> Self {
        Self(
            bands
                .iter()
                .map(|&(from, rate)| Band { from, rate })
                .collect(),
        )
    }

    pub fn bands(&self) -> &[Band] {
        &self.0
    }

    fn validate(&self, table: &'static str) -> ConfigResult<()> {
        let Some(first) = self.0.first() else {
            return Err(ConfigError::EmptyBands { table });
        };
        if first.from != 0.0 {
            return Err(ConfigError::UnorderedBands { table });
        }
        if self.0.windows(2).any(|w| !(w[0].from < w[1].from)) {
            return Err(ConfigError::UnorderedBands { table });
        }
        for band in &self.0 {
            check_rate(table, band.rate)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeRate {
    pub age: u32,
    pub rate: f64,
}

pub fn rate_for_age(table: &[AgeRate], age: u32) -> f64 {
    table
        .iter()
        .filter(|entry| entry.age <= age)
        .max_by_key(|entry| entry.age)
        .map(|entry| entry.rate)
        .unwrap_or(0.0)
}

pub trait TaxRuleSet {
    fn income_tax_bands(&self, married: bool) -> &BandTable;
    fn lump_sum_bands(&self) -> &BandTable;
    fn usc_bands(&self) -> &BandTable;
    fn usc_reduced_bands(&self) -> &BandTable;

    fn personal_credit(&self) -> f64;
    fn employee_credit(&self) -> f64;
    fn married_band_increase_cap(&self) -> f64;
    fn income_tax_exemption_limit(&self) -> f64;
    fn income_tax_exemption_age(&self) -> u32;
    fn pension_earnings_limit(&self) -> f64;

    fn prsi_rate(&self) -> f64;
    fn prsi_exemption_age(&self) -> u32;

    fn usc_exempt_amount(&self) -> f64;
    fn usc_reduced_rate_age(&self) -> u32;
    fn usc_reduced_rate_max_income(&self) -> f64;

    fn cgt_rate(&self) -> f64;
    fn cgt_annual_relief(&self) -> f64;
    fn exit_tax_rate(&self) -> f64;
    fn deemed_disposal_years(&self) -> u32;

    fn min_retirement_age(&self) -> u32;
    fn lump_sum_fraction(&self) -> f64;
    fn minimum_drawdown_rate(&self, age: u32) -> f64;
    fn max_contribution_rate(&self, age: u32) -> f64;
    fn state_pension_age(&self) -> u32;

    fn validate(&self) -> ConfigResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleSet {
    pub income_tax_single_bands: BandTable,
    pub income_tax_married_bands: BandTable,
    pub lump_sum_bands: BandTable,
    pub usc_bands: BandTable,
    pub usc_reduced_bands: BandTable,
    pub personal_credit: f64,
    pub employee_credit: f64,
    pub married_band_increase_cap: f64,
    pub income_tax_exemption_limit: f64,
    pub income_tax_exemption_age: u32,
    pub pension_earnings_limit: f64,
    pub prsi_rate: f64,
    pub prsi_exemption_age: u32,
    pub usc_exempt_amount: f64,
    pub usc_reduced_rate_age: u32,
    pub usc_reduced_rate_max_income: f64,
    pub cgt_rate: f64,
    pub cgt_annual_relief: f64,
    pub exit_tax_rate: f64,
    pub deemed_disposal_years: u32,
    pub min_retirement_age: u32,
    pub lump_sum_fraction: f64,
    pub minimum_drawdown: Vec<AgeRate>,
    pub pension_contribution_limits: Vec<AgeRate>,
    pub state_pension_age: u32,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            income_tax_single_bands: BandTable::new(&[(0.0, 0.20), (42_000.0, 0.40)]),
            income_tax_married_bands: BandTable::new(&[(0.0, 0.20), (51_000.0, 0.40)]),
            lump_sum_bands: BandTable::new(&[(0.0, 0.0), (200_000.0, 0.20), (500_000.0, 0.40)]),
            usc_bands: BandTable::new(&[
                (0.0, 0.005),
                (12_012.0, 0.02),
                (25_760.0, 0.04),
                (70_044.0, 0.08),
            ]),
            usc_reduced_bands: BandTable::new(&[(0.0, 0.005), (12_012.0, 0.02)]),
            personal_credit: 1_875.0,
            employee_credit: 1_875.0,
            married_band_increase_cap: 33_000.0,
            income_tax_exemption_limit: 18_000.0,
            income_tax_exemption_age: 65,
            pension_earnings_limit: 115_000.0,
            prsi_rate: 0.041,
            prsi_exemption_age: 66,
            usc_exempt_amount: 13_000.0,
            usc_reduced_rate_age: 70,
            usc_reduced_rate_max_income: 60_000.0,
            cgt_rate: 0.33,
            cgt_annual_relief: 1_270.0,
            exit_tax_rate: 0.41,
            deemed_disposal_years: 8,
            min_retirement_age: 60,
            lump_sum_fraction: 0.25,
            minimum_drawdown: vec![
                AgeRate { age: 0, rate: 0.0 },
                AgeRate { age: 61, rate: 0.04 },
                AgeRate { age: 71, rate: 0.05 },
            ],
            pension_contribution_limits: vec![
                AgeRate { age: 0, rate: 0.15 },
                AgeRate { age: 30, rate: 0.20 },
                AgeRate { age: 40, rate: 0.25 },
                AgeRate { age: 50, rate: 0.30 },
                AgeRate { age: 55, rate: 0.35 },
                AgeRate { age: 60, rate: 0.40 },
            ],
            state_pension_age: 66,
        }
    }
}

fn check_rate(name: &str, rate: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange {
            name: name.to_string(),
            value: rate,
        })
    }
}

impl TaxRuleSet for RuleSet {
    fn validate(&self) -> ConfigResult<()> {
        self.income_tax_single_bands.validate("incomeTaxSingleBands")?;
        self.income_tax_married_bands.validate("incomeTaxMarriedBands")?;
        self.lump_sum_bands.validate("lumpSumBands")?;
        self.usc_bands.validate("uscBands")?;
        self.usc_reduced_bands.validate("uscReducedBands")?;

        for (name, rate) in [
            ("prsiRate", self.prsi_rate),
            ("cgtRate", self.cgt_rate),
            ("exitTaxRate", self.exit_tax_rate),
            ("lumpSumFraction", self.lump_sum_fraction),
        ] {
            check_rate(name, rate)?;
        }
        for entry in self
            .minimum_drawdown
            .iter()
            .chain(&self.pension_contribution_limits)
        {
            check_rate("ageBandedRate", entry.rate)?;
        }

        for (name, value) in [
            ("personalCredit", self.personal_credit),
            ("employeeCredit", self.employee_credit),
            ("marriedBandIncreaseCap", self.married_band_increase_cap),
            ("incomeTaxExemptionLimit", self.income_tax_exemption_limit),
            ("pensionEarningsLimit", self.pension_earnings_limit),
            ("uscExemptAmount", self.usc_exempt_amount),
            ("uscReducedRateMaxIncome", self.usc_reduced_rate_max_income),
            ("cgtAnnualRelief", self.cgt_annual_relief),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeValue {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    fn income_tax_bands(&self, married: bool) -> &BandTable {
        if married {
            &self.income_tax_married_bands
        } else {
            &self.income_tax_single_bands
        }
    }

    fn lump_sum_bands(&self) -> &BandTable {
        &self.lump_sum_bands
    }

    fn usc_bands(&self) -> &BandTable {
        &self.usc_bands
    }

    fn usc_reduced_bands(&self) -> &BandTable {
        &self.usc_reduced_bands
    }

    fn personal_credit(&self) -> f64 {
        self.personal_credit
    }

    fn employee_credit(&self) -> f64 {
        self.employee_credit
    }

    fn married_band_increase_cap(&self) -> f64 {
        self.married_band_increase_cap
    }

    fn income_tax_exemption_limit(&self) -> f64 {
        self.income_tax_exemption_limit
    }

    fn income_tax_exemption_age(&self) -> u32 {
        self.income_tax_exemption_age
    }

    fn pension_earnings_limit(&self) -> f64 {
        self.pension_earnings_limit
    }

    fn prsi_rate(&self) -> f64 {
        self.prsi_rate
    }

    fn prsi_exemption_age(&self) -> u32 {
        self.prsi_exemption_age
    }

    fn usc_exempt_amount(&self) -> f64 {
        self.usc_exempt_amount
    }

    fn usc_reduced_rate_age(&self) -> u32 {
        self.usc_reduced_rate_age
    }

    fn usc_reduced_rate_max_income(&self) -> f64 {
        self.usc_reduced_rate_max_income
    }

    fn cgt_rate(&self) -> f64 {
        self.cgt_rate
    }

    fn cgt_annual_relief(&self) -> f64 {
        self.cgt_annual_relief
    }

    fn exit_tax_rate(&self) -> f64 {
        self.exit_tax_rate
    }

    fn deemed_disposal_years(&self) -> u32 {
        self.deemed_disposal_years
    }

    fn min_retirement_age(&self) -> u32 {
        self.min_retirement_age
    }

    fn lump_sum_fraction(&self) -> f64 {
        self.lump_sum_fraction
    }

    fn minimum_drawdown_rate(&self, age: u32) -> f64 {
        rate_for_age(&self.minimum_drawdown, age)
    }

    fn max_contribution_rate(&self, age: u32) -> f64 {
        rate_for_age(&self.pension_contribution_limits, age)
    }

    fn state_pension_age(&self) -> u32 {
        self.state_pension_age
    }
}
