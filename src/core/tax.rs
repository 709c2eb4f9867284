use super::engine::SimulationContext;
use super::rules::{BandTable, TaxRuleSet};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IncomeKind {
    Rsu,
    Rental,
    DefinedBenefit,
    PrivatePension,
    StatePension,
    LumpSum,
    Investment,
    TaxFree,
}

#[derive(Debug, Clone, Copy)]
struct Salary {
    amount: f64,
    contribution_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct GainBucket {
    rate: f64,
    amount: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TaxLedger {
    salaries: Vec<Salary>,
    ordinary_income: f64,
    pension_income: f64,
    state_pension_income: f64,
    investment_income: f64,
    tax_free_income: f64,
    lump_sum_total: f64,
    lump_sum_count: u32,
    pension_contributions: f64,
    gains: Vec<GainBucket>,
    exit_tax_gains: Vec<GainBucket>,
    income_tax: f64,
    prsi: f64,
    usc: f64,
    cgt: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaxFigures {
    pub income_tax: f64,
    pub prsi: f64,
    pub usc: f64,
    pub cgt: f64,
}

impl TaxFigures {
    pub fn total(self) -> f64 {
        self.income_tax + self.prsi + self.usc + self.cgt
    }
}

impl TaxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn declare_salary(&mut self, amount: f64, pension_contribution_rate: f64) {
        let amount = amount.max(0.0);
        let contribution_rate = pension_contribution_rate.max(0.0);
        let idx = self.salaries.partition_point(|s| s.amount <= amount);
        self.salaries.insert(
            idx,
            Salary {
                amount,
                contribution_rate,
            },
        );
        self.ordinary_income += amount;
        self.pension_contributions += amount * contribution_rate;
    }

    pub fn declare_other_income(&mut self, kind: IncomeKind, amount: f64) {
        match kind {
            IncomeKind::Rsu | IncomeKind::Rental => self.ordinary_income += amount,
            IncomeKind::DefinedBenefit | IncomeKind::PrivatePension => {
                self.pension_income += amount
            }
            IncomeKind::StatePension => self.state_pension_income += amount,
            IncomeKind::Investment => self.investment_income += amount,
            IncomeKind::TaxFree => self.tax_free_income += amount,
            IncomeKind::LumpSum => {
                self.lump_sum_total += amount;
                self.lump_sum_count += 1;
            }
        }
    }

    pub fn declare_gain(&mut self, amount: f64, rate: f64) {
        add_to_bucket(&mut self.gains, amount, rate);
    }

    pub fn declare_exit_tax_gain(&mut self, amount: f64, rate: f64) {
        add_to_bucket(&mut self.exit_tax_gains, amount, rate);
    }

    pub fn compute_taxes<R: TaxRuleSet + ?Sized>(&mut self, ctx: &SimulationContext<'_, R>) {
        self.income_tax = self.compute_income_tax(ctx);
        self.prsi = self.compute_prsi(ctx);
        self.usc = self.compute_usc(ctx);
        self.cgt = self.compute_cgt(ctx);
    }

    pub fn taxes(&self) -> TaxFigures {
        TaxFigures {
            income_tax: self.income_tax,
            prsi: self.prsi,
            usc: self.usc,
            cgt: self.cgt,
        }
    }

    pub fn gross_income(&self) -> f64 {
        self.ordinary_income
            + self.pension_income
            + self.state_pension_income
            + self.investment_income
            + self.tax_free_income
            + self.lump_sum_total
    }

    pub fn net_income(&self) -> f64 {
        self.gross_income() - self.pension_contributions - self.taxes().total()
    }

    pub fn salary_total(&self) -> f64 {
        self.salaries.iter().map(|s| s.amount).sum()
    }

    pub fn ordinary_income(&self) -> f64 {
        self.ordinary_income
    }

    pub fn pension_income(&self) -> f64 {
        self.pension_income
    }

    pub fn state_pension_income(&self) -> f64 {
        self.state_pension_income
    }

    pub fn investment_income(&self) -> f64 {
        self.investment_income
    }

    pub fn tax_free_income(&self) -> f64 {
        self.tax_free_income
    }

    pub fn lump_sum_total(&self) -> f64 {
        self.lump_sum_total
    }

    pub fn pension_contributions(&self) -> f64 {
        self.pension_contributions
    }

    pub fn realized_gains(&self) -> f64 {
        self.gains
            .iter()
            .chain(&self.exit_tax_gains)
            .map(|bucket| bucket.amount)
            .sum()
    }

    fn taxable_income(&self) -> f64 {
        self.ordinary_income + self.pension_income + self.state_pension_income + self.investment_income
    }

    fn pension_relief<R: TaxRuleSet + ?Sized>(&self, ctx: &SimulationContext<'_, R>) -> f64 {
        let limit = ctx.adjust(ctx.rules.pension_earnings_limit());
        self.salaries
            .iter()
            .map(|s| s.amount.min(limit) * s.contribution_rate)
            .sum()
    }

    fn compute_income_tax<R: TaxRuleSet + ?Sized>(&self, ctx: &SimulationContext<'_, R>) -> f64 {
        let rules = ctx.rules;
        let people = if ctx.married { 2.0 } else { 1.0 };
        let taxable = (self.taxable_income() - self.pension_relief(ctx)).max(0.0);

        let exempt = ctx.age > rules.income_tax_exemption_age()
            && taxable < ctx.adjust(rules.income_tax_exemption_limit()) * people
            && self.lump_sum_count == 0;
        if exempt {
            return 0.0;
        }

        let band_increase = if self.salaries.len() > 1 {
            self.salaries[0]
                .amount
                .min(ctx.adjust(rules.married_band_increase_cap()))
        } else {
            0.0
        };
        let band_tax = progressive_tax(
            rules.income_tax_bands(ctx.married),
            taxable,
            ctx.inflation_factor,
            1.0,
            band_increase,
        );

        let earners = (self.salaries.len() as f64).min(people);
        let credits = rules.personal_credit() * people + rules.employee_credit() * earners;

        let lump_sum_tax = if self.lump_sum_count > 0 {
            progressive_tax(
                rules.lump_sum_bands(),
                self.lump_sum_total,
                ctx.inflation_factor,
                self.lump_sum_count as f64,
                0.0,
            )
        } else {
            0.0
        };

        (band_tax - credits).max(0.0) + lump_sum_tax
    }

    fn compute_prsi<R: TaxRuleSet + ?Sized>(&self, ctx: &SimulationContext<'_, R>) -> f64 {
        if ctx.age > ctx.rules.prsi_exemption_age() {
            return 0.0;
        }
        (self.ordinary_income + self.investment_income).max(0.0) * ctx.rules.prsi_rate()
    }

    fn compute_usc<R: TaxRuleSet + ?Sized>(&self, ctx: &SimulationContext<'_, R>) -> f64 {
        let rules = ctx.rules;
        let salary_total = self.salary_total();
        let extra = (self.ordinary_income - salary_total) + self.pension_income + self.investment_income;
        let total = salary_total + extra;

        let reduced = ctx.age >= rules.usc_reduced_rate_age()
            && total < ctx.adjust(rules.usc_reduced_rate_max_income());
        let bands = if reduced {
            rules.usc_reduced_bands()
        } else {
            rules.usc_bands()
        };
        let exempt = ctx.adjust(rules.usc_exempt_amount());

        let mut amounts: Vec<f64> = self.salaries.iter().map(|s| s.amount).collect();
        match amounts.first_mut() {
            Some(lowest) => *lowest += extra,
            None => amounts.push(extra),
        }

        amounts
            .into_iter()
            .filter(|&amount| amount > exempt)
            .map(|amount| progressive_tax(bands, amount, ctx.inflation_factor, 1.0, 0.0))
            .sum()
    }

    fn compute_cgt<R: TaxRuleSet + ?Sized>(&self, ctx: &SimulationContext<'_, R>) -> f64 {
        let mut buckets = self.gains.clone();
        buckets.sort_by(|a, b| b.rate.total_cmp(&a.rate));

        // Relief offsets the highest-taxed gains first; losses carry down.
        let mut running = -ctx.adjust(ctx.rules.cgt_annual_relief());
        let mut tax = 0.0;
        for bucket in buckets {
            running += bucket.amount;
            tax += (running * bucket.rate).max(0.0);
            running = running.min(0.0);
        }

        let exit_tax: f64 = self
            .exit_tax_gains
            .iter()
            .map(|bucket| (bucket.amount * bucket.rate).max(0.0))
            .sum();

        tax + exit_tax
    }
}

fn add_to_bucket(buckets: &mut Vec<GainBucket>, amount: f64, rate: f64) {
    match buckets.iter_mut().find(|b| (b.rate - rate).abs() < 1e-12) {
        Some(bucket) => bucket.amount += amount,
        None => buckets.push(GainBucket { rate, amount }),
    }
}

pub fn progressive_tax(
    bands: &BandTable,
    income: f64,
    inflation_factor: f64,
    multiplier: f64,
    increase: f64,
) -> f64 {
    let bound = |from: f64| {
        if from <= 0.0 {
            0.0
        } else {
            from * inflation_factor * multiplier + increase
        }
    };

    let bands = bands.bands();
    let mut tax = 0.0;
    for (idx, band) in bands.iter().enumerate() {
        let lower = bound(band.from);
        let upper = bands
            .get(idx + 1)
            .map(|next| bound(next.from))
            .unwrap_or(f64::INFINITY);
        tax += (income.min(upper) - lower).max(0.0) * band.rate;
    }
    tax
}
