//! Customer deduplication and customer numbers (`K-NNNNNN`).

use std::collections::HashSet;

use rand::Rng;
use serde::Deserialize;

use crate::models::{Customer, CustomerInput};

/// Criteria for `POST /api/customers/search`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub org_nr: Option<String>,
    pub phone: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        [&self.company_name, &self.email, &self.org_nr, &self.phone]
            .into_iter()
            .all(|v| present(v).is_none())
    }

    /// Company name contained case-insensitively, or email, org number or
    /// phone exactly equal.
    pub fn matches(&self, customer: &Customer) -> bool {
        if let Some(name) = present(&self.company_name) {
            if customer
                .company_name
                .to_lowercase()
                .contains(&name.to_lowercase())
            {
                return true;
            }
        }

        let exact = [
            (present(&self.email), customer.email.as_deref()),
            (present(&self.org_nr), customer.org_nr.as_deref()),
            (present(&self.phone), customer.phone.as_deref()),
        ];
        exact
            .into_iter()
            .any(|(wanted, have)| wanted.is_some() && wanted == have)
    }
}

impl From<&CustomerInput> for SearchQuery {
    fn from(input: &CustomerInput) -> Self {
        Self {
            company_name: input.company_name.clone(),
            email: input.email.clone(),
            org_nr: input.org_nr.clone(),
            phone: input.phone.clone(),
        }
    }
}

/// First customer matching the query, in the order given.
pub fn find_match<'a>(customers: &'a [Customer], query: &SearchQuery) -> Option<&'a Customer> {
    if query.is_empty() {
        return None;
    }
    customers.iter().find(|c| query.matches(c))
}

pub fn normalize_customer_number(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Hands out customer numbers that are unique among those already taken.
#[derive(Debug, Default)]
pub struct NumberPool {
    taken: HashSet<String>,
}

impl NumberPool {
    pub fn new<I, S>(taken: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            taken: taken
                .into_iter()
                .map(|n| normalize_customer_number(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_taken(&self, number: &str) -> bool {
        self.taken.contains(&normalize_customer_number(number))
    }

    /// Keep the requested number when it is free, otherwise generate one.
    pub fn claim(&mut self, requested: Option<&str>) -> String {
        let requested = requested.map(normalize_customer_number).filter(|n| !n.is_empty());
        match requested {
            Some(number) if !self.taken.contains(&number) => {
                self.taken.insert(number.clone());
                number
            }
            _ => self.generate(),
        }
    }

    pub fn generate(&mut self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = format!("K-{}", rng.gen_range(100_000..1_000_000));
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
