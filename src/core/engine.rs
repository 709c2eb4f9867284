use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::error::ConfigResult;
use super::holding::{InvestmentHolding, Portfolio, RetirementPot, TaxTreatmentPolicy};
use super::property::Property;
use super::rules::{RuleSet, TaxRuleSet};
use super::sampler::{GrowthSampler, derive_seed};
use super::solver::{WithdrawalOutcome, resolve_deficit, spendable_income};
use super::tax::{IncomeKind, TaxLedger};
use super::types::{
    AggregateRow, DeterministicResult, EventKind, MonteCarloSummary, Parameters,
    ProjectionOutcome, Row, Scenario, SimEvent,
};

pub struct SimulationContext<'a, R: TaxRuleSet + ?Sized> {
    pub rules: &'a R,
    pub age: u32,
    pub partner_age: Option<u32>,
    pub year: u32,
    pub married: bool,
    pub cash: f64,
    pub inflation_factor: f64,
}

impl<'a, R: TaxRuleSet + ?Sized> SimulationContext<'a, R> {
    pub fn new(rules: &'a R, age: u32, married: bool) -> Self {
        Self {
            rules,
            age,
            partner_age: None,
            year: 0,
            married,
            cash: 0.0,
            inflation_factor: 1.0,
        }
    }

    pub fn adjust(&self, value: f64) -> f64 {
        value * self.inflation_factor
    }
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub success: bool,
    pub rows: Vec<Row>,
}

pub fn run_projection(scenario: &Scenario) -> ConfigResult<ProjectionOutcome> {
    match &scenario.rules {
        Some(rules) => run(&scenario.parameters, &scenario.events, rules),
        None => run(&scenario.parameters, &scenario.events, &RuleSet::default()),
    }
}

pub fn run<R: TaxRuleSet + Sync + ?Sized>(
    params: &Parameters,
    events: &[SimEvent],
    rules: &R,
) -> ConfigResult<ProjectionOutcome> {
    rules.validate()?;
    params.validate()?;
    for event in events {
        event.validate()?;
    }

    if params.is_deterministic() {
        log::info!(
            "projection: deterministic run from age {} to {}",
            params.start_age,
            params.target_age
        );
        let trial = simulate_trial(params, events, rules, params.seed);
        log::info!("projection: success={}", trial.success);
        return Ok(ProjectionOutcome::Deterministic(DeterministicResult {
            success: trial.success,
            rows: trial.rows,
        }));
    }

    let trials = params.monte_carlo_trials;
    log::info!(
        "projection: {trials} Monte Carlo trials from age {} to {}",
        params.start_age,
        params.target_age
    );
    let results: Vec<TrialResult> = (0..trials)
        .into_par_iter()
        .map(|trial| simulate_trial(params, events, rules, derive_seed(params.seed, trial)))
        .collect();

    let summary = summarize_trials(params, &results);
    log::info!("projection: success rate {:.4}", summary.success_rate);
    Ok(ProjectionOutcome::MonteCarlo(summary))
}

fn summarize_trials(params: &Parameters, results: &[TrialResult]) -> MonteCarloSummary {
    let ages = (params.start_age..=params.target_age).collect::<Vec<_>>();
    let mut acc = YearlyAccumulator::new(ages, results.len());
    let mut successes = 0_u32;
    for result in results {
        if result.success {
            successes += 1;
        }
        for (idx, row) in result.rows.iter().enumerate() {
            acc.push(idx, row);
        }
    }

    MonteCarloSummary {
        success_rate: successes as f64 / results.len().max(1) as f64,
        trials: results.len() as u32,
        aggregates: acc.into_results(),
    }
}

struct YearlyAccumulator {
    ages: Vec<u32>,
    net_income: Vec<Vec<f64>>,
    expenses: Vec<Vec<f64>>,
    cash: Vec<Vec<f64>>,
    worth: Vec<Vec<f64>>,
    deficit: Vec<Vec<f64>>,
}

impl YearlyAccumulator {
    fn new(ages: Vec<u32>, expected_samples: usize) -> Self {
        let year_count = ages.len();
        let make = || {
            (0..year_count)
                .map(|_| Vec::with_capacity(expected_samples))
                .collect::<Vec<_>>()
        };

        Self {
            ages,
            net_income: make(),
            expenses: make(),
            cash: make(),
            worth: make(),
            deficit: make(),
        }
    }

    fn push(&mut self, index: usize, row: &Row) {
        if index >= self.ages.len() {
            return;
        }
        self.net_income[index].push(row.net_income);
        self.expenses[index].push(row.expenses);
        self.cash[index].push(row.cash);
        self.worth[index].push(row.worth);
        self.deficit[index].push(if row.unresolved_deficit > 0.0 { 1.0 } else { 0.0 });
    }

    fn into_results(mut self) -> Vec<AggregateRow> {
        let mut results = Vec::with_capacity(self.ages.len());
        for idx in 0..self.ages.len() {
            results.push(AggregateRow {
                age: self.ages[idx],
                mean_net_income: mean(&self.net_income[idx]),
                mean_expenses: mean(&self.expenses[idx]),
                mean_cash: mean(&self.cash[idx]),
                mean_worth: mean(&self.worth[idx]),
                median_worth: percentile(&mut self.worth[idx], 50.0),
                p10_worth: percentile(&mut self.worth[idx], 10.0),
                p90_worth: percentile(&mut self.worth[idx], 90.0),
                deficit_rate: mean(&self.deficit[idx]),
            });
        }
        results
    }
}

fn initial_portfolio<R: TaxRuleSet + ?Sized>(params: &Parameters, rules: &R) -> Portfolio {
    let mut pension = RetirementPot::new(params.pension_return_mean, params.pension_return_stdev);
    pension.buy(params.initial_pension);
    let mut partner_pension =
        RetirementPot::new(params.pension_return_mean, params.pension_return_stdev);
    partner_pension.buy(params.initial_partner_pension);

    let mut funds = InvestmentHolding::new(
        TaxTreatmentPolicy::ExitTax {
            rate: rules.exit_tax_rate(),
            deemed_disposal_years: rules.deemed_disposal_years(),
        },
        params.fund_return_mean,
        params.fund_return_stdev,
    );
    funds.buy(params.initial_funds);

    let mut trusts = InvestmentHolding::new(
        TaxTreatmentPolicy::CapitalGains {
            rate: rules.cgt_rate(),
        },
        params.trust_return_mean,
        params.trust_return_stdev,
    );
    trusts.buy(params.initial_trusts);

    Portfolio {
        pension,
        partner_pension,
        funds,
        trusts,
        properties: Vec::new(),
    }
}

pub fn simulate_trial<R: TaxRuleSet + ?Sized>(
    params: &Parameters,
    events: &[SimEvent],
    rules: &R,
    seed: u64,
) -> TrialResult {
    let mut sampler = GrowthSampler::new(seed);
    let mut ledger = TaxLedger::new();
    let mut portfolio = initial_portfolio(params, rules);
    let mut ctx = SimulationContext::new(rules, params.start_age, params.married);
    ctx.cash = params.initial_cash;

    let years = params.target_age.saturating_sub(params.start_age) as usize + 1;
    let mut rows = Vec::with_capacity(years);
    let mut success = true;

    for (year, age) in (params.start_age..=params.target_age).enumerate() {
        ctx.age = age;
        ctx.partner_age = params.partner_age_at(year as u32);
        ctx.year = year as u32;
        ctx.inflation_factor = (1.0 + params.inflation).powi(year as i32);
        ledger.reset();

        let row = simulate_year(
            params,
            events,
            &mut ctx,
            &mut ledger,
            &mut portfolio,
            &mut sampler,
        );
        if row.unresolved_deficit > 0.0 {
            log::debug!(
                "age={age} unresolved deficit {:.2}",
                row.unresolved_deficit
            );
            success = false;
        }
        rows.push(row);
    }

    TrialResult { success, rows }
}

fn market_override(events: &[SimEvent], age: u32) -> Option<f64> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::MarketOverride && e.is_active(age))
        .filter_map(|e| {
            let years = (e.last_age() - e.from_age + 1) as f64;
            e.rate.map(|total| (1.0 + total).max(0.0).powf(1.0 / years) - 1.0)
        })
        .last()
}

fn simulate_year<R: TaxRuleSet + ?Sized>(
    params: &Parameters,
    events: &[SimEvent],
    ctx: &mut SimulationContext<'_, R>,
    ledger: &mut TaxLedger,
    portfolio: &mut Portfolio,
    sampler: &mut GrowthSampler,
) -> Row {
    let age = ctx.age;
    let rules = ctx.rules;
    let mut row = Row {
        age,
        ..Row::default()
    };

    let market = market_override(events, age);
    let pension_rate = sampler.sample(
        portfolio.pension.holding().return_mean,
        portfolio.pension.holding().return_stdev,
        market,
    );
    let fund_rate = sampler.sample(
        portfolio.funds.return_mean,
        portfolio.funds.return_stdev,
        market,
    );
    let trust_rate = sampler.sample(
        portfolio.trusts.return_mean,
        portfolio.trusts.return_stdev,
        market,
    );
    portfolio.pension.add_year(pension_rate, ledger);
    portfolio.partner_pension.add_year(pension_rate, ledger);
    portfolio.funds.add_year(fund_rate, ledger);
    portfolio.trusts.add_year(trust_rate, ledger);
    for property in portfolio.properties.iter_mut() {
        property.add_year();
    }

    let interest = ctx.cash.max(0.0) * params.cash_interest_rate;
    if interest > 0.0 {
        ledger.declare_other_income(IncomeKind::Investment, interest);
        row.investment_income = interest;
    }

    // Scheduled events. Purchases first so a mortgage can attach to them.
    let mut expenses = 0.0;
    for event in events.iter().filter(|e| e.kind == EventKind::RealEstate) {
        if age == event.from_age {
            portfolio
                .properties
                .push(Property::buy(&event.id, event.amount, event.rate.unwrap_or(0.0)));
            ctx.cash -= event.amount;
            row.property_purchases += event.amount;
        }
        if event.to_age == Some(age) {
            for property in portfolio.properties.iter_mut() {
                if property.id == event.id && !property.is_sold() {
                    ctx.cash += property.sell();
                }
            }
        }
    }

    for event in events.iter().filter(|e| e.is_active(age)) {
        let amount = event.amount_at(age, params.inflation);
        match event.kind {
            EventKind::Salary => {
                let rate = params.pension_contribution_fraction * rules.max_contribution_rate(age);
                ledger.declare_salary(amount, rate);
                let contribution = amount * (rate + event.match_rate.unwrap_or(0.0));
                portfolio.pension.buy(contribution);
                row.salaries += amount;
                row.pension_contribution += contribution;
            }
            EventKind::PartnerSalary => {
                let partner_age = ctx.partner_age.unwrap_or(age);
                let rate =
                    params.pension_contribution_fraction * rules.max_contribution_rate(partner_age);
                ledger.declare_salary(amount, rate);
                let contribution = amount * (rate + event.match_rate.unwrap_or(0.0));
                portfolio.partner_pension.buy(contribution);
                row.salaries += amount;
                row.pension_contribution += contribution;
            }
            EventKind::SalaryNoPension | EventKind::PartnerSalaryNoPension => {
                ledger.declare_salary(amount, 0.0);
                row.salaries += amount;
            }
            EventKind::Rsu => {
                ledger.declare_other_income(IncomeKind::Rsu, amount);
                row.rsu_income += amount;
            }
            EventKind::Rental => {
                ledger.declare_other_income(IncomeKind::Rental, amount);
                row.rental_income += amount;
            }
            EventKind::DefinedBenefit => {
                ledger.declare_other_income(IncomeKind::DefinedBenefit, amount);
                row.defined_benefit += amount;
            }
            EventKind::TaxFree => {
                ledger.declare_other_income(IncomeKind::TaxFree, amount);
                row.tax_free_income += amount;
            }
            EventKind::Expense => expenses += amount,
            EventKind::Mortgage => {
                if age == event.from_age {
                    let years = event.last_age() - event.from_age;
                    for property in portfolio.properties.iter_mut() {
                        if property.id == event.id && !property.is_sold() {
                            property.mortgage(years, event.rate.unwrap_or(0.0), event.amount);
                        }
                    }
                }
            }
            EventKind::Relocation => {
                if age == event.from_age {
                    log::debug!("age={age} relocation marker '{}' ignored", event.id);
                }
            }
            EventKind::RealEstate | EventKind::MarketOverride => {}
        }
    }
    expenses += portfolio
        .properties
        .iter()
        .map(Property::payment)
        .sum::<f64>();

    if age >= rules.state_pension_age() {
        let state_pension = ctx.adjust(params.state_pension_weekly * 52.0);
        ledger.declare_other_income(IncomeKind::StatePension, state_pension);
        row.state_pension = state_pension;
    }

    if age >= params.retirement_age {
        if params.take_lump_sum {
            row.lump_sum += portfolio
                .pension
                .take_lump_sum_if_eligible(age, rules, ledger);
        }
        row.private_pension += portfolio.pension.drawdown(age, rules, ledger);
    }
    if let Some(partner_age) = ctx.partner_age {
        if partner_age >= params.retirement_age {
            if params.take_lump_sum {
                row.lump_sum += portfolio
                    .partner_pension
                    .take_lump_sum_if_eligible(partner_age, rules, ledger);
            }
            row.private_pension += portfolio
                .partner_pension
                .drawdown(partner_age, rules, ledger);
        }
    }

    // Close the year: cover any shortfall, then bank or invest any surplus.
    let cash_deficit = (-ctx.cash).max(0.0);
    ctx.cash = ctx.cash.max(0.0);
    let outcome = resolve_deficit(
        ctx,
        ledger,
        portfolio,
        expenses,
        cash_deficit,
        params.priorities,
    );
    let spendable = spendable_income(ledger, &outcome.withdrawn);
    let surplus = spendable - expenses - cash_deficit;
    if surplus > 0.0 {
        invest_surplus(params, ctx, portfolio, surplus);
    }

    record_outcome(&mut row, ledger, &outcome, spendable, expenses);
    row.pension_capital = portfolio.pension.capital();
    row.partner_pension_capital = portfolio.partner_pension.capital();
    row.fund_capital = portfolio.funds.capital();
    row.trust_capital = portfolio.trusts.capital();
    row.real_estate_capital = portfolio.real_estate_capital();
    row.cash = ctx.cash;
    row.worth = portfolio.total() + ctx.cash;
    row
}

fn invest_surplus<R: TaxRuleSet + ?Sized>(
    params: &Parameters,
    ctx: &mut SimulationContext<'_, R>,
    portfolio: &mut Portfolio,
    surplus: f64,
) {
    let stash_gap = (ctx.adjust(params.emergency_stash) - ctx.cash).max(0.0);
    let to_stash = surplus.min(stash_gap);
    ctx.cash += to_stash;

    let investable = surplus - to_stash;
    if investable <= 0.0 {
        return;
    }
    let to_funds = investable * params.fund_allocation;
    let to_trusts = investable * params.trust_allocation;
    portfolio.funds.buy(to_funds);
    portfolio.trusts.buy(to_trusts);
    ctx.cash += investable - to_funds - to_trusts;
}

fn record_outcome(
    row: &mut Row,
    ledger: &TaxLedger,
    outcome: &WithdrawalOutcome,
    spendable: f64,
    expenses: f64,
) {
    let taxes = ledger.taxes();
    row.private_pension += outcome.withdrawn.pension;
    row.fund_sales = outcome.withdrawn.funds;
    row.trust_sales = outcome.withdrawn.trusts;
    row.cash_withdrawn = outcome.withdrawn.cash;
    row.realized_gains = ledger.realized_gains();
    row.income_tax = taxes.income_tax;
    row.prsi = taxes.prsi;
    row.usc = taxes.usc;
    row.cgt = taxes.cgt;
    row.net_income = spendable;
    row.expenses = expenses;
    row.unresolved_deficit = if outcome.is_resolved() {
        0.0
    } else {
        outcome.outstanding
    };
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
