use super::engine::SimulationContext;
use super::holding::Portfolio;
use super::rules::TaxRuleSet;
use super::tax::{IncomeKind, TaxLedger};
use super::types::Priorities;

pub const CONVERGENCE_EPSILON: f64 = 0.75;
const MAX_ITERATIONS_PER_SLOT: u32 = 500;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AssetKind {
    Cash,
    Pension,
    Funds,
    Trusts,
}

const SCAN_ORDER: [AssetKind; 4] = [
    AssetKind::Cash,
    AssetKind::Pension,
    AssetKind::Funds,
    AssetKind::Trusts,
];

fn slot_of(priorities: Priorities, kind: AssetKind) -> u8 {
    match kind {
        AssetKind::Cash => priorities.cash,
        AssetKind::Pension => priorities.pension,
        AssetKind::Funds => priorities.funds,
        AssetKind::Trusts => priorities.trusts,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WithdrawalState {
    pub cash: f64,
    pub pension: f64,
    pub funds: f64,
    pub trusts: f64,
}

impl WithdrawalState {
    pub fn capital_returned(&self) -> f64 {
        self.cash + self.funds + self.trusts
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalOutcome {
    pub withdrawn: WithdrawalState,
    pub outstanding: f64,
    pub iterations: u32,
}

impl WithdrawalOutcome {
    pub fn is_resolved(&self) -> bool {
        self.outstanding <= CONVERGENCE_EPSILON
    }
}

pub fn spendable_income(ledger: &TaxLedger, state: &WithdrawalState) -> f64 {
    ledger.net_income() + state.capital_returned()
}

pub fn resolve_deficit<R: TaxRuleSet + ?Sized>(
    ctx: &mut SimulationContext<'_, R>,
    ledger: &mut TaxLedger,
    portfolio: &mut Portfolio,
    expenses: f64,
    cash_deficit: f64,
    priorities: Priorities,
) -> WithdrawalOutcome {
    let mut state = WithdrawalState::default();
    let mut iterations = 0;
    let target = expenses + cash_deficit;

    for slot in 1..=4u8 {
        let kinds: Vec<AssetKind> = SCAN_ORDER
            .iter()
            .copied()
            .filter(|&kind| slot_of(priorities, kind) == slot)
            .collect();
        if kinds.is_empty() {
            continue;
        }

        let mut slot_iterations = 0;
        // Each sale can change the year's taxes, so the need is re-derived every pass.
        loop {
            ledger.compute_taxes(ctx);
            let need = target - spendable_income(ledger, &state);
            if need <= CONVERGENCE_EPSILON {
                return WithdrawalOutcome {
                    withdrawn: state,
                    outstanding: need.max(0.0),
                    iterations,
                };
            }
            if slot_iterations >= MAX_ITERATIONS_PER_SLOT {
                log::warn!(
                    "age={} withdrawal slot {slot} hit iteration cap with need {need:.2}",
                    ctx.age
                );
                break;
            }
            slot_iterations += 1;
            iterations += 1;

            let mut progressed = false;
            for &kind in &kinds {
                if withdraw(kind, need, ctx, ledger, portfolio, &mut state) > 0.0 {
                    progressed = true;
                    break;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    ledger.compute_taxes(ctx);
    let outstanding = (target - spendable_income(ledger, &state)).max(0.0);
    WithdrawalOutcome {
        withdrawn: state,
        outstanding,
        iterations,
    }
}

fn withdraw<R: TaxRuleSet + ?Sized>(
    kind: AssetKind,
    need: f64,
    ctx: &mut SimulationContext<'_, R>,
    ledger: &mut TaxLedger,
    portfolio: &mut Portfolio,
    state: &mut WithdrawalState,
) -> f64 {
    match kind {
        AssetKind::Cash => {
            let amount = ctx.cash.min(need).max(0.0);
            ctx.cash -= amount;
            state.cash += amount;
            amount
        }
        AssetKind::Pension => {
            let pots = [
                (&mut portfolio.pension, Some(ctx.age)),
                (&mut portfolio.partner_pension, ctx.partner_age),
            ];
            for (pot, owner_age) in pots {
                let accessible = owner_age.is_some_and(|age| pot.is_accessible(age, ctx.rules));
                if !accessible {
                    continue;
                }
                let amount = pot.sell(need, ledger);
                if amount > 0.0 {
                    ledger.declare_other_income(IncomeKind::PrivatePension, amount);
                    state.pension += amount;
                    return amount;
                }
            }
            0.0
        }
        AssetKind::Funds => {
            let proceeds = portfolio.funds.sell(need, ledger);
            state.funds += proceeds;
            proceeds
        }
        AssetKind::Trusts => {
            let proceeds = portfolio.trusts.sell(need, ledger);
            state.trusts += proceeds;
            proceeds
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::holding::{InvestmentHolding, RetirementPot, TaxTreatmentPolicy};
    use crate::core::rules::RuleSet;
    use proptest::prelude::{prop_assert, proptest};

    fn portfolio(pension: f64, funds: f64, trusts: f64) -> Portfolio {
        let mut pot = RetirementPot::new(0.0, 0.0);
        pot.buy(pension);
        let partner_pot = RetirementPot::new(0.0, 0.0);
        let mut fund = InvestmentHolding::new(
            TaxTreatmentPolicy::ExitTax {
                rate: 0.41,
                deemed_disposal_years: 8,
            },
            0.0,
            0.0,
        );
        fund.buy(funds);
        let mut trust =
            InvestmentHolding::new(TaxTreatmentPolicy::CapitalGains { rate: 0.33 }, 0.0, 0.0);
        trust.buy(trusts);
        Portfolio {
            pension: pot,
            partner_pension: partner_pot,
            funds: fund,
            trusts: trust,
            properties: Vec::new(),
        }
    }

    fn priorities(cash: u8, pension: u8, funds: u8, trusts: u8) -> Priorities {
        Priorities {
            cash,
            pension,
            funds,
            trusts,
        }
    }

    #[test]
    fn cash_first_covers_small_deficit() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        ctx.cash = 10_000.0;
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 5_000.0, 5_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            4_000.0,
            0.0,
            priorities(1, 0, 2, 3),
        );

        assert!(outcome.is_resolved());
        assert!((outcome.withdrawn.cash - 4_000.0).abs() < 1e-9);
        assert!((ctx.cash - 6_000.0).abs() < 1e-9);
        assert_eq!(outcome.withdrawn.funds, 0.0);
        assert!((assets.funds.capital() - 5_000.0).abs() < 1e-9);
    }

    #[test]
    fn falls_through_slots_in_order() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        ctx.cash = 1_000.0;
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 2_000.0, 10_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            5_000.0,
            0.0,
            priorities(1, 0, 2, 3),
        );

        assert!(outcome.is_resolved());
        assert!((outcome.withdrawn.cash - 1_000.0).abs() < 1e-9);
        assert!((outcome.withdrawn.funds - 2_000.0).abs() < 1e-9);
        assert!((outcome.withdrawn.trusts - 2_000.0).abs() < 1.0);
    }

    #[test]
    fn shared_slot_drains_in_scan_order() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        ctx.cash = 1_000.0;
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 0.0, 50_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            3_000.0,
            0.0,
            priorities(1, 0, 0, 1),
        );

        assert!(outcome.is_resolved());
        assert!((outcome.withdrawn.cash - 1_000.0).abs() < 1e-9);
        assert!((outcome.withdrawn.trusts - 2_000.0).abs() < 1.0);
    }

    #[test]
    fn pension_withdrawals_are_grossed_up_for_tax() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 62, false);
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(500_000.0, 0.0, 0.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            60_000.0,
            0.0,
            priorities(0, 1, 0, 0),
        );

        assert!(outcome.is_resolved());
        assert!(outcome.withdrawn.pension > 60_000.0);
        assert!(ledger.taxes().income_tax > 0.0);
        assert!((ledger.net_income() - 60_000.0).abs() <= CONVERGENCE_EPSILON);
        assert!(outcome.iterations > 1);
    }

    #[test]
    fn pension_is_skipped_before_retirement_age() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 45, false);
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(500_000.0, 0.0, 0.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            20_000.0,
            0.0,
            priorities(0, 1, 0, 0),
        );

        assert!(!outcome.is_resolved());
        assert!((outcome.outstanding - 20_000.0).abs() < 1e-9);
        assert!((assets.pension.capital() - 500_000.0).abs() < 1e-9);
    }

    #[test]
    fn partner_pot_is_used_once_the_partner_can_access_it() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 55, true);
        ctx.partner_age = Some(62);
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(300_000.0, 0.0, 0.0);
        assets.partner_pension.buy(200_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            10_000.0,
            0.0,
            priorities(0, 1, 0, 0),
        );

        assert!(outcome.is_resolved());
        assert!((assets.pension.capital() - 300_000.0).abs() < 1e-9);
        assert!(assets.partner_pension.capital() < 200_000.0);
        assert!(outcome.withdrawn.pension >= 10_000.0);
    }

    #[test]
    fn partner_pot_is_skipped_while_partner_is_too_young() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 62, true);
        ctx.partner_age = Some(50);
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 0.0, 0.0);
        assets.partner_pension.buy(200_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            10_000.0,
            0.0,
            priorities(0, 1, 0, 0),
        );

        assert!(!outcome.is_resolved());
        assert!((assets.partner_pension.capital() - 200_000.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_capital_reports_unresolved_deficit() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        ctx.cash = 1_000.0;
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 1_000.0, 1_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            10_000.0,
            0.0,
            priorities(1, 0, 2, 3),
        );

        assert!(!outcome.is_resolved());
        assert!((outcome.outstanding - 7_000.0).abs() < 1e-6);
        assert_eq!(ctx.cash, 0.0);
        assert_eq!(assets.funds.capital(), 0.0);
        assert_eq!(assets.trusts.capital(), 0.0);
    }

    #[test]
    fn unused_slot_is_never_touched() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 10_000.0, 0.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            1_000.0,
            0.0,
            priorities(1, 0, 0, 0),
        );

        assert!(!outcome.is_resolved());
        assert!((assets.funds.capital() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn negative_need_is_a_no_op() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        ctx.cash = 500.0;
        let mut ledger = TaxLedger::new();
        ledger.declare_other_income(IncomeKind::TaxFree, 10_000.0);
        let mut assets = portfolio(0.0, 1_000.0, 0.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            2_000.0,
            0.0,
            Priorities::default(),
        );

        assert!(outcome.is_resolved());
        assert_eq!(outcome.outstanding, 0.0);
        assert_eq!(outcome.withdrawn, WithdrawalState::default());
        assert_eq!(ctx.cash, 500.0);
    }

    #[test]
    fn cash_deficit_adds_to_need() {
        let rules = RuleSet::default();
        let mut ctx = SimulationContext::new(&rules, 50, false);
        let mut ledger = TaxLedger::new();
        let mut assets = portfolio(0.0, 0.0, 10_000.0);

        let outcome = resolve_deficit(
            &mut ctx,
            &mut ledger,
            &mut assets,
            1_000.0,
            500.0,
            priorities(0, 0, 0, 1),
        );

        assert!(outcome.is_resolved());
        assert!((outcome.withdrawn.trusts - 1_500.0).abs() < 1.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(40))]

        #[test]
        fn prop_waterfall_terminates_and_drains_before_failing(
            cash in 0u32..50_000,
            pension in 0u32..400_000,
            funds in 0u32..100_000,
            trusts in 0u32..100_000,
            expenses in 0u32..150_000,
            age in 40u32..80,
            p_cash in 0u8..5,
            p_pension in 0u8..5,
            p_funds in 0u8..5,
            p_trusts in 0u8..5,
        ) {
            let rules = RuleSet::default();
            let mut ctx = SimulationContext::new(&rules, age, false);
            ctx.cash = cash as f64;
            let mut ledger = TaxLedger::new();
            let mut assets = portfolio(pension as f64, funds as f64, trusts as f64);
            let order = priorities(p_cash, p_pension, p_funds, p_trusts);

            let outcome = resolve_deficit(
                &mut ctx,
                &mut ledger,
                &mut assets,
                expenses as f64,
                0.0,
                order,
            );

            prop_assert!(outcome.outstanding.is_finite());
            prop_assert!(outcome.outstanding >= 0.0);
            if !outcome.is_resolved() {
                if p_cash > 0 {
                    prop_assert!(ctx.cash <= 1e-6);
                }
                if p_funds > 0 {
                    prop_assert!(assets.funds.capital() <= 1e-6);
                }
                if p_trusts > 0 {
                    prop_assert!(assets.trusts.capital() <= 1e-6);
                }
                if p_pension > 0 && age >= rules.min_retirement_age {
                    prop_assert!(assets.pension.capital() <= 1e-6);
                }
            }
        }
    }
}
