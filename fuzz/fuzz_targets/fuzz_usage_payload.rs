#![no_main]
use libfuzzer_sys::fuzz_target;
use nereus::config::SyncConfig;
use nereus::provider::parse_usage_response;
use nereus::reconcile::{ExistingSeries, ReconcileInput, ReconciliationEngine};
use nereus::statistics::Reading;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    // Classify the body as the read endpoint would
    let Ok(Some(usage)) = parse_usage_response(200, body) else {
        return;
    };

    // Treat every hourly line as a day and merge; totals must never fall
    let Some(start) = chrono::NaiveDate::from_ymd_opt(2025, 1, 1) else {
        return;
    };
    let readings: Vec<Reading> = usage
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| Reading::new(start + chrono::Duration::days(i as i64 % 28), line.usage))
        .collect();
    let engine = ReconciliationEngine::new(chrono_tz::Europe::London, &SyncConfig::default());
    let merge = engine.reconcile(&ReconcileInput {
        readings: &readings,
        cursor: None,
        today: start + chrono::Duration::days(28),
        unit_price: 0.003,
        consumption: ExistingSeries::default(),
        cost: ExistingSeries::default(),
    });
    assert!(merge.consumption.windows(2).all(|w| w[1].sum >= w[0].sum));
    assert!(merge.cost.windows(2).all(|w| w[1].sum >= w[0].sum));
});
