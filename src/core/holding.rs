use std::collections::VecDeque;

use super::property::Property;
use super::rules::TaxRuleSet;
use super::tax::{IncomeKind, TaxLedger};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TaxTreatmentPolicy {
    CapitalGains { rate: f64 },
    ExitTax { rate: f64, deemed_disposal_years: u32 },
    Pension,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tranche {
    pub principal: f64,
    pub growth: f64,
    pub acquisition_order: u64,
    pub years_held: u32,
}

impl Tranche {
    pub fn value(&self) -> f64 {
        self.principal + self.growth
    }
}

#[derive(Debug, Clone)]
pub struct InvestmentHolding {
    tranches: VecDeque<Tranche>,
    policy: TaxTreatmentPolicy,
    next_order: u64,
    pub return_mean: f64,
    pub return_stdev: f64,
}

impl InvestmentHolding {
    pub fn new(policy: TaxTreatmentPolicy, return_mean: f64, return_stdev: f64) -> Self {
        Self {
            tranches: VecDeque::new(),
            policy,
            next_order: 0,
            return_mean,
            return_stdev,
        }
    }

    pub fn policy(&self) -> TaxTreatmentPolicy {
        self.policy
    }

    pub fn tranches(&self) -> impl Iterator<Item = &Tranche> {
        self.tranches.iter()
    }

    pub fn capital(&self) -> f64 {
        self.tranches.iter().map(Tranche::value).sum()
    }

    pub fn buy(&mut self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        self.tranches.push_back(Tranche {
            principal: amount,
            growth: 0.0,
            acquisition_order: self.next_order,
            years_held: 0,
        });
        self.next_order += 1;
    }

    pub fn add_year(&mut self, rate: f64, ledger: &mut TaxLedger) -> f64 {
        let interval = match self.policy {
            TaxTreatmentPolicy::ExitTax {
                deemed_disposal_years,
                ..
            } => deemed_disposal_years,
            _ => 0,
        };

        let mut deemed_gain = 0.0;
        for tranche in self.tranches.iter_mut() {
            tranche.growth += tranche.value() * rate;
            tranche.years_held += 1;

            // Deemed sale and repurchase at current value; order is kept.
            if interval > 0 && tranche.years_held >= interval {
                deemed_gain += tranche.growth;
                tranche.principal = tranche.value();
                tranche.growth = 0.0;
                tranche.years_held = 0;
            }
        }
        self.tranches.retain(|t| t.value() > 0.0);

        if deemed_gain != 0.0 {
            self.declare_gain(deemed_gain, ledger);
        }
        deemed_gain
    }

    pub fn sell(&mut self, amount: f64, ledger: &mut TaxLedger) -> f64 {
        let mut remaining = amount.min(self.capital()).max(0.0);
        let proceeds = remaining;
        let mut realised = 0.0;

        while remaining > 0.0 {
            let Some(front) = self.tranches.front_mut() else {
                break;
            };
            let value = front.value();
            if value <= remaining {
                realised += front.growth;
                remaining -= value;
                self.tranches.pop_front();
            } else {
                let fraction = remaining / value;
                realised += front.growth * fraction;
                front.principal *= 1.0 - fraction;
                front.growth *= 1.0 - fraction;
                remaining = 0.0;
            }
        }

        if realised != 0.0 {
            self.declare_gain(realised, ledger);
        }
        proceeds
    }

    fn declare_gain(&self, gain: f64, ledger: &mut TaxLedger) {
        match self.policy {
            TaxTreatmentPolicy::CapitalGains { rate } => ledger.declare_gain(gain, rate),
            TaxTreatmentPolicy::ExitTax { rate, .. } => ledger.declare_exit_tax_gain(gain, rate),
            TaxTreatmentPolicy::Pension => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetirementPot {
    holding: InvestmentHolding,
    lump_sum_taken: bool,
}

impl RetirementPot {
    pub fn new(return_mean: f64, return_stdev: f64) -> Self {
        Self {
            holding: InvestmentHolding::new(TaxTreatmentPolicy::Pension, return_mean, return_stdev),
            lump_sum_taken: false,
        }
    }

    pub fn holding(&self) -> &InvestmentHolding {
        &self.holding
    }

    pub fn capital(&self) -> f64 {
        self.holding.capital()
    }

    pub fn buy(&mut self, amount: f64) {
        self.holding.buy(amount);
    }

    pub fn add_year(&mut self, rate: f64, ledger: &mut TaxLedger) {
        self.holding.add_year(rate, ledger);
    }

    pub fn sell(&mut self, amount: f64, ledger: &mut TaxLedger) -> f64 {
        self.holding.sell(amount, ledger)
    }

    pub fn is_accessible<R: TaxRuleSet + ?Sized>(&self, age: u32, rules: &R) -> bool {
        age >= rules.min_retirement_age()
    }

    pub fn lump_sum_taken(&self) -> bool {
        self.lump_sum_taken
    }

    pub fn take_lump_sum_if_eligible<R: TaxRuleSet + ?Sized>(
        &mut self,
        age: u32,
        rules: &R,
        ledger: &mut TaxLedger,
    ) -> f64 {
        if self.lump_sum_taken || !self.is_accessible(age, rules) {
            return 0.0;
        }
        let amount = self.sell(self.capital() * rules.lump_sum_fraction(), ledger);
        ledger.declare_other_income(IncomeKind::LumpSum, amount);
        self.lump_sum_taken = true;
        amount
    }

    pub fn drawdown<R: TaxRuleSet + ?Sized>(
        &mut self,
        age: u32,
        rules: &R,
        ledger: &mut TaxLedger,
    ) -> f64 {
        if !self.is_accessible(age, rules) {
            return 0.0;
        }
        let amount = self.sell(self.capital() * rules.minimum_drawdown_rate(age), ledger);
        if amount > 0.0 {
            ledger.declare_other_income(IncomeKind::PrivatePension, amount);
        }
        amount
    }
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub pension: RetirementPot,
    pub partner_pension: RetirementPot,
    pub funds: InvestmentHolding,
    pub trusts: InvestmentHolding,
    pub properties: Vec<Property>,
}

impl Portfolio {
    pub fn real_estate_capital(&self) -> f64 {
        self.properties.iter().map(Property::capital).sum()
    }

    pub fn total(&self) -> f64 {
        self.pension.capital()
            + self.partner_pension.capital()
            + self.funds.capital()
            + self.trusts.capital()
            + self.real_estate_capital()
    }
}
