//! In-process metric registry.
//!
//! # Responsibilities
//! - Per-route and per-method request counters
//! - Distinct bearer tokens seen (active users)
//! - Running pizza purchase and revenue totals
//!
//! # Design Decisions
//! - One registry is constructed at startup and shared via `Arc`; tests build
//!   their own fresh instance
//! - Counters live in `DashMap`s so request tasks on different worker threads
//!   never contend on a single lock
//! - Each series is individually consistent; a snapshot is not a cross-series
//!   atomic cut

use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::Mutex;

/// `(method, route pattern)` key for per-route counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub method: String,
    pub route: String,
}

impl RouteKey {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
        }
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.method, self.route)
    }
}

/// Running totals from successful order submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PizzaAggregate {
    /// Sum of ordered item counts.
    pub purchase_count: u64,
    /// Sum of item prices, in currency units.
    pub revenue_total: f64,
}

impl PizzaAggregate {
    /// Revenue as whole cents, rounded to nearest.
    ///
    /// Any positive revenue reports at least one cent.
    pub fn revenue_cents(&self) -> u64 {
        if !self.revenue_total.is_finite() || self.revenue_total <= 0.0 {
            return 0;
        }
        let cents = (self.revenue_total * 100.0).round();
        if cents < 1.0 {
            1
        } else {
            cents as u64
        }
    }
}

/// Immutable read of every series at roughly one instant.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub routes: HashMap<RouteKey, u64>,
    pub methods: HashMap<String, u64>,
    pub active_users: usize,
    pub pizza: PizzaAggregate,
}

impl RegistrySnapshot {
    pub fn total_requests(&self) -> u64 {
        self.routes.values().sum()
    }
}

/// Process-wide counters, gauges and sets.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    routes: DashMap<RouteKey, u64>,
    methods: DashMap<String, u64>,
    users: DashSet<String>,
    pizza: Mutex<PizzaAggregate>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for `(method, route)` and return the new total.
    pub fn increment_route(&self, method: &str, route: &str) -> u64 {
        let mut count = self.routes.entry(RouteKey::new(method, route)).or_insert(0);
        *count += 1;
        *count
    }

    /// Increment the counter for `method` and return the new total.
    pub fn increment_method(&self, method: &str) -> u64 {
        let mut count = self.methods.entry(method.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Remember a bearer token. Idempotent.
    pub fn record_user(&self, token: &str) {
        if !self.users.contains(token) {
            self.users.insert(token.to_string());
        }
    }

    /// Add an order to the pizza totals.
    ///
    /// Negative or non-finite revenue contributes nothing.
    pub fn record_pizza_order(&self, item_count: u64, revenue: f64) {
        let revenue = if revenue.is_finite() && revenue > 0.0 {
            revenue
        } else {
            0.0
        };
        let mut pizza = self.pizza.lock().unwrap_or_else(|e| e.into_inner());
        pizza.purchase_count = pizza.purchase_count.saturating_add(item_count);
        pizza.revenue_total += revenue;
    }

    /// Forget every recorded bearer token.
    pub fn clear_users(&self) {
        self.users.clear();
    }

    pub fn route_count(&self, key: &RouteKey) -> u64 {
        self.routes.get(key).map(|c| *c).unwrap_or(0)
    }

    pub fn method_count(&self, method: &str) -> u64 {
        self.methods.get(method).map(|c| *c).unwrap_or(0)
    }

    pub fn active_users(&self) -> usize {
        self.users.len()
    }

    pub fn pizza(&self) -> PizzaAggregate {
        *self.pizza.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            routes: self
                .routes
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
            active_users: self.users.len(),
            pizza: self.pizza(),
        }
    }
}
