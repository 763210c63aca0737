use super::*;

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            account_number: String::new(),
            meter_id: String::new(),
            client_id: "cedfde2d-79a7-44fd-9833-cae769640d3d".to_string(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            liter_cost: 0.0030682,
            currency: "GBP".to_string(),
            min_liter_cost: 0.00005,
            max_liter_cost: 1.0,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backfill_days: 30,
            max_fetch_span_days: 31,
            revision_lookback_days: 0,
            fetch_hours: vec![15, 23],
            fetch_minute: None,
            run_on_startup: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validity_minutes: 30,
            login_max_attempts: 3,
            login_retry_delay_ms: 5000,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2000,
            max_retry_delay_ms: 30000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            consumption_id: "nereus:water_consumption".to_string(),
            consumption_name: "Water Consumption".to_string(),
            cost_id: "nereus:water_cost".to_string(),
            cost_name: "Water Cost".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            statistics_file: "/data/nereus_statistics.json".to_string(),
            state_file: "/data/nereus_state.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/nereus.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: AccountConfig::default(),
            pricing: PricingConfig::default(),
            sync: SyncConfig::default(),
            session: SessionConfig::default(),
            fetch: FetchConfig::default(),
            statistics: StatisticsConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            timezone: "Europe/London".to_string(),
        }
    }
}
