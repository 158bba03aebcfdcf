//! Usage and quota tracker
//!
//! Holds the in-memory ledger of [`UsageRecord`]s bucketed by UTC day and
//! gates executions against the configured ceilings.
//!
//! Admission is a reservation: [`UsageTracker::reserve`] checks the daily
//! ceilings against committed usage *plus* outstanding reservations and
//! books the estimate in the same critical section. Two callers racing for
//! the last unit of budget therefore cannot both be admitted. Every
//! reservation is later either [committed](UsageTracker::commit) with the
//! real record or [released](UsageTracker::release).
//!
//! Events are emitted after the ledger lock is dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use promptgate_common::{Clock, SystemClock};
use promptgate_domain::{
    AlertSettings, CostBreakdownEntry, DenialReason, PersistenceError, PersistenceResult,
    PriceTable, QuotaDenial, TokenUsage, UsageLimits, UsagePeriod, UsageQuota, UsageRecord,
    UsageTotals,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::alerts::{AlertThrottle, QuotaAlert};
use crate::ports::{EventSink, GatewayEvent, NullEventSink};

//==============================================================================
// Settings
//==============================================================================

/// Everything the tracker reads from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub limits: UsageLimits,
    pub pricing: PriceTable,
    pub alerts: AlertSettings,
    pub retention_days: u32,
    pub max_unflushed: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            limits: UsageLimits::default(),
            pricing: PriceTable::default(),
            alerts: AlertSettings::default(),
            retention_days: promptgate_domain::constants::DEFAULT_RETENTION_DAYS,
            max_unflushed: promptgate_domain::constants::DEFAULT_MAX_UNFLUSHED,
        }
    }
}

//==============================================================================
// Admission
//==============================================================================

/// Result of a pre-flight check
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed { estimated_cost: f64 },
    Denied(QuotaDenial),
}

impl Admission {
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Budget booked by [`UsageTracker::reserve`]
///
/// Must be handed back through `commit` or `release`.
#[derive(Debug, PartialEq)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    tokens: u64,
    cost: f64,
}

impl Reservation {
    pub const fn tokens(&self) -> u64 {
        self.tokens
    }

    pub const fn estimated_cost(&self) -> f64 {
        self.cost
    }
}

//==============================================================================
// Ledger
//==============================================================================

#[derive(Debug, Default)]
struct DayBucket {
    totals: UsageTotals,
    records: Vec<UsageRecord>,
}

#[derive(Debug, Default)]
struct Pending {
    tokens: u64,
    cost: f64,
    requests: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    days: BTreeMap<NaiveDate, DayBucket>,
    pending: Pending,
    unflushed: Vec<UsageRecord>,
    throttle: AlertThrottle,
    last_monthly_warning: Option<DateTime<Utc>>,
}

impl Ledger {
    fn day_totals(&self, day: NaiveDate) -> UsageTotals {
        self.days.get(&day).map(|bucket| bucket.totals).unwrap_or_default()
    }

    fn month_totals(&self, day: NaiveDate) -> UsageTotals {
        let (first, next) = month_bounds(day);
        let mut totals = UsageTotals::default();
        for bucket in self.days.range(first..next).map(|(_, bucket)| bucket) {
            totals.merge(&bucket.totals);
        }
        totals
    }

    fn period_totals(&self, period: UsagePeriod, day: NaiveDate) -> UsageTotals {
        match period {
            UsagePeriod::Daily => self.day_totals(day),
            UsagePeriod::Monthly => self.month_totals(day),
        }
    }

    fn period_records(
        &self,
        period: UsagePeriod,
        day: NaiveDate,
    ) -> impl Iterator<Item = &UsageRecord> {
        let (first, next) = match period {
            UsagePeriod::Daily => (day, day.succ_opt().unwrap_or(NaiveDate::MAX)),
            UsagePeriod::Monthly => month_bounds(day),
        };
        self.days.range(first..next).flat_map(|(_, bucket)| bucket.records.iter())
    }

    fn append(&mut self, record: UsageRecord) {
        let bucket = self.days.entry(record.timestamp.date_naive()).or_default();
        bucket.totals.add(&record);
        bucket.records.push(record);
    }

    fn release(&mut self, reservation: &Reservation) {
        self.pending.tokens = self.pending.tokens.saturating_sub(reservation.tokens);
        self.pending.cost = (self.pending.cost - reservation.cost).max(0.0);
        self.pending.requests = self.pending.requests.saturating_sub(1);
    }
}

//==============================================================================
// Tracker
//==============================================================================

/// Thread-safe usage ledger and quota gate
pub struct UsageTracker<C: Clock = SystemClock> {
    ledger: Mutex<Ledger>,
    settings: RwLock<TrackerSettings>,
    events: Arc<dyn EventSink>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for UsageTracker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("UsageTracker")
            .field("days", &ledger.days.len())
            .field("unflushed", &ledger.unflushed.len())
            .finish_non_exhaustive()
    }
}

impl UsageTracker<SystemClock> {
    pub fn new(settings: TrackerSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }
}

impl<C: Clock> UsageTracker<C> {
    pub fn with_clock(settings: TrackerSettings, clock: Arc<C>) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            settings: RwLock::new(settings),
            events: Arc::new(NullEventSink),
            clock,
        }
    }

    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> TrackerSettings {
        self.settings.read().clone()
    }

    /// Replace limits, prices and alert behavior for subsequent calls
    pub fn update_settings(&self, settings: TrackerSettings) {
        *self.settings.write() = settings;
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }

    //--------------------------------------------------------------------------
    // Pricing
    //--------------------------------------------------------------------------

    /// Cost of a call with a known token split
    pub fn calculate_cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.settings.read().pricing.lookup(model).cost(usage)
    }

    /// Upper-bound cost used for admission when only a total is known
    pub fn estimate_cost(&self, model: &str, tokens: u64) -> f64 {
        self.settings.read().pricing.lookup(model).conservative_cost(tokens)
    }

    //--------------------------------------------------------------------------
    // Admission
    //--------------------------------------------------------------------------

    /// Check whether a call could be admitted right now, without booking it
    pub fn can_execute(&self, estimated_tokens: u64, model: &str) -> Admission {
        let settings = self.settings.read().clone();
        let estimated_cost = settings.pricing.lookup(model).conservative_cost(estimated_tokens);
        let now = self.now();

        let ledger = self.ledger.lock();
        match check_admission(&ledger, &settings, now, estimated_tokens, estimated_cost) {
            Ok(()) => Admission::Allowed { estimated_cost },
            Err(denial) => Admission::Denied(denial),
        }
    }

    /// Check and book an estimate in one step
    pub fn reserve(&self, estimated_tokens: u64, model: &str) -> Result<Reservation, QuotaDenial> {
        let settings = self.settings.read().clone();
        let cost = settings.pricing.lookup(model).conservative_cost(estimated_tokens);
        let now = self.now();

        let monthly_warning = {
            let mut ledger = self.ledger.lock();
            if let Err(denial) = check_admission(&ledger, &settings, now, estimated_tokens, cost) {
                drop(ledger);
                info!(reason = %denial.reason, model, estimated_tokens, "usage_denied");
                return Err(denial);
            }
            ledger.pending.tokens = ledger.pending.tokens.saturating_add(estimated_tokens);
            ledger.pending.cost += cost;
            ledger.pending.requests += 1;
            monthly_warning(&mut ledger, &settings, now)
        };

        if let Some(percent_used) = monthly_warning {
            self.events.emit(GatewayEvent::MonthlyUsageWarning { percent_used });
        }
        debug!(model, estimated_tokens, estimated_cost = cost, "usage_reserved");
        Ok(Reservation { tokens: estimated_tokens, cost })
    }

    /// Replace a reservation with the record of what actually happened
    pub fn commit(&self, reservation: Reservation, record: UsageRecord) {
        let settings = self.settings.read().clone();
        let now = self.now();

        let alerts = {
            let mut ledger = self.ledger.lock();
            ledger.release(&reservation);
            append_record(&mut ledger, &settings, now, record)
        };
        self.emit_alerts(alerts);
    }

    /// Return a reservation unused (cache hit, open circuit, cancellation)
    pub fn release(&self, reservation: Reservation) {
        self.ledger.lock().release(&reservation);
    }

    /// Record a call made outside the reservation flow
    ///
    /// Denied when the record would push the current day past a ceiling.
    /// The check and the append happen under one lock.
    pub fn track_usage(&self, record: UsageRecord) -> Result<(), QuotaDenial> {
        let settings = self.settings.read().clone();
        let now = self.now();

        let alerts = {
            let mut ledger = self.ledger.lock();
            let today = now.date_naive();
            if record.timestamp.date_naive() == today {
                let projected = projected_daily(&ledger, today, record.tokens_used, record.cost);
                if let Some(denial) = exceeds_daily(&projected, &settings.limits) {
                    drop(ledger);
                    info!(reason = %denial.reason, model = %record.model, "usage_record_denied");
                    return Err(denial);
                }
            }
            append_record(&mut ledger, &settings, now, record)
        };
        self.emit_alerts(alerts);
        Ok(())
    }

    fn emit_alerts(&self, alerts: Vec<QuotaAlert>) {
        for alert in alerts {
            warn!(
                period = %alert.period,
                threshold = alert.threshold,
                percent_used = alert.percent_used,
                "usage_threshold_crossed"
            );
            self.events.emit(GatewayEvent::QuotaThreshold {
                period: alert.period,
                threshold: alert.threshold,
                percent_used: alert.percent_used,
            });
        }
    }

    //--------------------------------------------------------------------------
    // Reporting
    //--------------------------------------------------------------------------

    /// Snapshot of the current day or month
    pub fn check_quota(&self, period: UsagePeriod) -> UsageQuota {
        let limits = self.settings.read().limits.for_period(period);
        let now = self.now();
        let used = self.ledger.lock().period_totals(period, now.date_naive());
        UsageQuota::compute(period, used, limits, reset_at(period, now))
    }

    pub fn totals(&self, period: UsagePeriod) -> UsageTotals {
        let today = self.now().date_naive();
        self.ledger.lock().period_totals(period, today)
    }

    /// Usage grouped by provider and model, most expensive first
    pub fn cost_breakdown(&self, period: UsagePeriod) -> Vec<CostBreakdownEntry> {
        let today = self.now().date_naive();
        let ledger = self.ledger.lock();

        let mut groups: HashMap<(&str, &str), CostBreakdownEntry> = HashMap::new();
        for record in ledger.period_records(period, today) {
            let entry = groups
                .entry((record.provider.as_str(), record.model.as_str()))
                .or_insert_with(|| CostBreakdownEntry {
                    provider: record.provider.clone(),
                    model: record.model.clone(),
                    requests: 0,
                    failed_requests: 0,
                    tokens: 0,
                    cost: 0.0,
                });
            entry.requests += 1;
            if !record.success {
                entry.failed_requests += 1;
            }
            entry.tokens = entry.tokens.saturating_add(record.tokens_used);
            entry.cost += record.cost;
        }

        let mut entries: Vec<CostBreakdownEntry> = groups.into_values().collect();
        entries.sort_by(|a, b| {
            b.cost
                .total_cmp(&a.cost)
                .then_with(|| a.provider.cmp(&b.provider))
                .then_with(|| a.model.cmp(&b.model))
        });
        entries
    }

    /// Every retained record, oldest day first
    pub fn records(&self) -> Vec<UsageRecord> {
        self.ledger.lock().days.values().flat_map(|bucket| bucket.records.iter().cloned()).collect()
    }

    pub fn export_json(&self) -> PersistenceResult<String> {
        serde_json::to_string_pretty(&self.records())
            .map_err(|error| PersistenceError::Serialization(error.to_string()))
    }

    pub fn export_csv(&self) -> String {
        let records = self.records();
        let mut out = String::with_capacity(64 * (records.len() + 1));
        out.push_str(UsageRecord::CSV_HEADER);
        out.push('\n');
        for record in &records {
            out.push_str(&record.to_csv_row());
            out.push('\n');
        }
        out
    }

    //--------------------------------------------------------------------------
    // Persistence support
    //--------------------------------------------------------------------------

    /// Records appended since the last call, in append order
    pub fn take_unflushed(&self) -> Vec<UsageRecord> {
        std::mem::take(&mut self.ledger.lock().unflushed)
    }

    /// Put records back after a failed save; they go ahead of newer ones
    pub fn requeue(&self, mut records: Vec<UsageRecord>) {
        let mut ledger = self.ledger.lock();
        records.append(&mut ledger.unflushed);
        ledger.unflushed = records;
    }

    /// Load persisted history; returns the number of records added
    ///
    /// Records whose id is already in the ledger are skipped, so a store
    /// holding a batch that was saved twice is counted once. Restored records
    /// are not flushed again.
    pub fn restore(&self, records: Vec<UsageRecord>) -> usize {
        let loaded = records.len();
        let count = {
            let mut ledger = self.ledger.lock();
            let mut seen: HashSet<Uuid> =
                ledger.days.values().flat_map(|bucket| bucket.records.iter().map(|r| r.id)).collect();
            let mut added = 0;
            for record in records {
                if seen.insert(record.id) {
                    ledger.append(record);
                    added += 1;
                }
            }
            added
        };
        if count < loaded {
            warn!(loaded, duplicates = loaded - count, "usage_restore_skipped_duplicates");
        }
        let pruned = self.prune();
        debug!(count, pruned, "usage_restored");
        count
    }

    /// Drop day buckets and unflushed records older than the retention window
    pub fn prune(&self) -> usize {
        let retention = i64::from(self.settings.read().retention_days);
        let cutoff = self.now().date_naive() - chrono::Duration::days(retention);

        let mut ledger = self.ledger.lock();
        let kept = ledger.days.split_off(&cutoff);
        let removed = std::mem::replace(&mut ledger.days, kept);
        ledger.unflushed.retain(|record| record.timestamp.date_naive() >= cutoff);
        removed.values().map(|bucket| bucket.records.len()).sum()
    }
}

//==============================================================================
// Helpers
//==============================================================================

fn projected_daily(ledger: &Ledger, today: NaiveDate, tokens: u64, cost: f64) -> UsageTotals {
    let used = ledger.day_totals(today);
    UsageTotals {
        tokens: used.tokens.saturating_add(ledger.pending.tokens).saturating_add(tokens),
        cost: used.cost + ledger.pending.cost + cost,
        requests: used.requests + ledger.pending.requests + 1,
        failed_requests: used.failed_requests,
    }
}

fn exceeds_daily(projected: &UsageTotals, limits: &UsageLimits) -> Option<QuotaDenial> {
    if projected.tokens > limits.daily_tokens {
        return Some(QuotaDenial {
            reason: DenialReason::DailyTokens,
            message: format!(
                "Daily token limit would be exceeded ({} of {})",
                projected.tokens, limits.daily_tokens
            ),
            suggestion: "Wait for the daily reset or raise limits.daily_tokens.".to_string(),
        });
    }
    if projected.cost > limits.daily_cost {
        return Some(QuotaDenial {
            reason: DenialReason::DailyCost,
            message: format!(
                "Daily cost limit would be exceeded (${:.4} of ${:.2})",
                projected.cost, limits.daily_cost
            ),
            suggestion: "Use a cheaper model, wait for the daily reset or raise limits.daily_cost."
                .to_string(),
        });
    }
    if projected.requests > limits.daily_requests {
        return Some(QuotaDenial {
            reason: DenialReason::DailyRequests,
            message: format!(
                "Daily request limit reached ({} of {})",
                projected.requests, limits.daily_requests
            ),
            suggestion: "Wait for the daily reset or raise limits.daily_requests.".to_string(),
        });
    }
    None
}

fn check_admission(
    ledger: &Ledger,
    settings: &TrackerSettings,
    now: DateTime<Utc>,
    estimated_tokens: u64,
    estimated_cost: f64,
) -> Result<(), QuotaDenial> {
    let limits = &settings.limits;
    if estimated_tokens > limits.per_request_tokens {
        return Err(QuotaDenial {
            reason: DenialReason::PerRequestTokens,
            message: format!(
                "Request needs {estimated_tokens} tokens, above the per-request limit of {}",
                limits.per_request_tokens
            ),
            suggestion: "Shorten the prompt or split the work into smaller requests.".to_string(),
        });
    }

    let projected = projected_daily(ledger, now.date_naive(), estimated_tokens, estimated_cost);
    exceeds_daily(&projected, limits).map_or(Ok(()), Err)
}

/// Monthly usage percentage when a warning is due
fn monthly_warning(ledger: &mut Ledger, settings: &TrackerSettings, now: DateTime<Utc>) -> Option<f64> {
    let month = settings.limits.for_period(UsagePeriod::Monthly);
    let used = ledger.month_totals(now.date_naive());
    let percent_used = UsageQuota::compute(UsagePeriod::Monthly, used, month, now).percent_used;
    if percent_used < settings.alerts.monthly_warning_percent {
        return None;
    }

    warn!(percent_used, "monthly_usage_high");
    let due = ledger.last_monthly_warning.map_or(true, |last| {
        (now - last).to_std().is_ok_and(|elapsed| elapsed >= settings.alerts.suppression_window)
    });
    if due {
        ledger.last_monthly_warning = Some(now);
        Some(percent_used)
    } else {
        None
    }
}

fn append_record(
    ledger: &mut Ledger,
    settings: &TrackerSettings,
    now: DateTime<Utc>,
    record: UsageRecord,
) -> Vec<QuotaAlert> {
    if ledger.unflushed.len() >= settings.max_unflushed {
        let excess = (ledger.unflushed.len() + 1 - settings.max_unflushed).min(ledger.unflushed.len());
        ledger.unflushed.drain(..excess);
        warn!(dropped = excess, cap = settings.max_unflushed, "usage_unflushed_overflow");
    }
    ledger.unflushed.push(record.clone());
    ledger.append(record);

    let today = now.date_naive();
    let mut alerts = Vec::new();
    for period in [UsagePeriod::Daily, UsagePeriod::Monthly] {
        let used = ledger.period_totals(period, today);
        let limits = settings.limits.for_period(period);
        let percent_used = UsageQuota::compute(period, used, limits, now).percent_used;
        alerts.extend(ledger.throttle.evaluate(
            period,
            percent_used,
            &settings.alerts.thresholds,
            settings.alerts.suppression_window,
            now,
        ));
    }
    alerts
}

fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let next = first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (first, next)
}

fn reset_at(period: UsagePeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let next = match period {
        UsagePeriod::Daily => today.succ_opt(),
        UsagePeriod::Monthly => Some(month_bounds(today).1),
    };
    next.and_then(|day| day.and_hms_opt(0, 0, 0)).map_or(now, |midnight| midnight.and_utc())
}
