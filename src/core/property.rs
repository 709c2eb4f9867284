#[derive(Debug, Clone, Copy)]
struct Mortgage {
    balance: f64,
    rate: f64,
    payment: f64,
    years_remaining: u32,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub id: String,
    down_payment: f64,
    borrowed: f64,
    appreciation: f64,
    years_owned: u32,
    mortgage: Option<Mortgage>,
    sold: bool,
}

impl Property {
    pub fn buy(id: impl Into<String>, down_payment: f64, appreciation: f64) -> Self {
        Self {
            id: id.into(),
            down_payment: down_payment.max(0.0),
            borrowed: 0.0,
            appreciation,
            years_owned: 0,
            mortgage: None,
            sold: false,
        }
    }

    pub fn mortgage(&mut self, years: u32, rate: f64, payment: f64) {
        if years == 0 || payment <= 0.0 {
            return;
        }
        let n = years as f64;
        let principal = if rate.abs() < 1e-12 {
            payment * n
        } else {
            payment * (1.0 - (1.0 + rate).powf(-n)) / rate
        };
        self.borrowed += principal;
        self.mortgage = Some(Mortgage {
            balance: principal,
            rate,
            payment,
            years_remaining: years,
        });
    }

    pub fn add_year(&mut self) {
        if self.sold {
            return;
        }
        self.years_owned += 1;
        if let Some(m) = self.mortgage.as_mut() {
            if m.years_remaining > 0 {
                m.balance = (m.balance * (1.0 + m.rate) - m.payment).max(0.0);
                m.years_remaining -= 1;
                if m.years_remaining == 0 {
                    m.balance = 0.0;
                }
            }
        }
    }

    pub fn payment(&self) -> f64 {
        match self.mortgage {
            Some(m) if m.years_remaining > 0 && !self.sold => m.payment,
            _ => 0.0,
        }
    }

    pub fn value(&self) -> f64 {
        if self.sold {
            return 0.0;
        }
        (self.down_payment + self.borrowed) * (1.0 + self.appreciation).powi(self.years_owned as i32)
    }

    pub fn capital(&self) -> f64 {
        let balance = self.mortgage.map(|m| m.balance).unwrap_or(0.0);
        (self.value() - balance).max(0.0)
    }

    pub fn sell(&mut self) -> f64 {
        let proceeds = self.capital();
        self.sold = true;
        self.mortgage = None;
        proceeds
    }

    pub fn is_sold(&self) -> bool {
        self.sold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn unmortgaged_property_appreciates() {
        let mut home = Property::buy("home", 100_000.0, 0.03);
        home.add_year();
        home.add_year();
        assert_approx(home.capital(), 100_000.0 * 1.03_f64.powi(2));
        assert_approx(home.payment(), 0.0);
    }

    #[test]
    fn mortgage_amortises_to_zero_over_term() {
        let mut home = Property::buy("home", 50_000.0, 0.0);
        home.mortgage(25, 0.04, 12_000.0);
        let borrowed = 12_000.0 * (1.0 - 1.04_f64.powf(-25.0)) / 0.04;
        assert_approx(home.value(), 50_000.0 + borrowed);
        assert_approx(home.capital(), 50_000.0);

        for _ in 0..25 {
            assert_approx(home.payment(), 12_000.0);
            home.add_year();
        }
        assert_approx(home.payment(), 0.0);
        assert_approx(home.capital(), home.value());
    }

    #[test]
    fn interest_free_mortgage_borrows_payment_times_years() {
        let mut flat = Property::buy("flat", 10_000.0, 0.0);
        flat.mortgage(10, 0.0, 5_000.0);
        assert_approx(flat.value(), 60_000.0);
        flat.add_year();
        assert_approx(flat.capital(), 15_000.0);
    }

    #[test]
    fn sale_releases_equity_and_clears_the_property() {
        let mut home = Property::buy("home", 40_000.0, 0.05);
        home.mortgage(20, 0.03, 10_000.0);
        home.add_year();
        let equity = home.capital();
        assert_approx(home.sell(), equity);
        assert!(home.is_sold());
        assert_approx(home.capital(), 0.0);
        assert_approx(home.payment(), 0.0);
    }
}
