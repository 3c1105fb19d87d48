//! Policy and lifecycle configuration.
//!
//! Every weight, threshold and floor the risk engine uses lives here so that
//! compliance can retune policy without touching the engine. The shipped
//! defaults mirror `data/risk/risk_policy.json` and
//! `data/lifecycle/lifecycle_config.json`.

use serde::{Deserialize, Serialize};

// ── Risk policy ────────────────────────────────────────────────────

/// Score contribution of each detection predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub sanctions_hit:                 u32,
    pub sanctions_potential_match:     u32,
    pub aml_score:                     u32,
    pub high_amount:                   u32,
    pub pep:                           u32,
    pub travel_rule_incomplete:        u32,
    pub virtual_asset_undisclosed:     u32,
    pub swift_ordering_customer:       u32,
    pub swift_beneficiary:             u32,
    pub swift_remittance_info:         u32,
    pub swift_charges:                 u32,
    pub kyc_overdue:                   u32,
    pub edd_not_performed:             u32,
    pub source_of_wealth_undocumented: u32,
    pub fx_spread:                     u32,
    pub daily_cash_volume:             u32,
    pub daily_cash_count:              u32,
    pub cash_id_unverified:            u32,
    pub off_hours:                     u32,
    pub weekend:                       u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Pre-computed AML score at or above which the AML predicate fires.
    pub aml_score:         f64,
    /// Amount strictly above which a transaction counts as large.
    pub large_amount:      f64,
    pub fx_spread_bps:     f64,
    pub daily_cash_volume: f64,
    pub daily_cash_count:  u32,
    /// Booking hours in [start, end) are business hours.
    pub business_hours_start: u32,
    pub business_hours_end:   u32,
}

/// Minimum scores that override the summed contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFloors {
    pub sanctions_hit:             u32,
    pub sanctions_potential_match: u32,
    pub large_amount:              u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub high:   u32,
    pub medium: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub weights:     RiskWeights,
    pub thresholds:  RiskThresholds,
    pub floors:      ScoreFloors,
    pub severity:    SeverityBands,
    pub score_ceiling: u32,
    /// Number of rule hits kept for display, in declared order.
    pub max_rule_hits: usize,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            weights: RiskWeights {
                sanctions_hit:                 50,
                sanctions_potential_match:     30,
                aml_score:                     25,
                high_amount:                   20,
                pep:                           30,
                travel_rule_incomplete:        20,
                virtual_asset_undisclosed:     20,
                swift_ordering_customer:       15,
                swift_beneficiary:             15,
                swift_remittance_info:         10,
                swift_charges:                 10,
                kyc_overdue:                   25,
                edd_not_performed:             25,
                source_of_wealth_undocumented: 15,
                fx_spread:                     15,
                daily_cash_volume:             15,
                daily_cash_count:              10,
                cash_id_unverified:            15,
                off_hours:                     10,
                weekend:                       10,
            },
            thresholds: RiskThresholds {
                aml_score:            70.0,
                large_amount:         100_000.0,
                fx_spread_bps:        150.0,
                daily_cash_volume:    10_000.0,
                daily_cash_count:     5,
                business_hours_start: 8,
                business_hours_end:   18,
            },
            floors: ScoreFloors {
                sanctions_hit:             95,
                sanctions_potential_match: 75,
                large_amount:              70,
            },
            severity: SeverityBands { high: 80, medium: 50 },
            score_ceiling: 100,
            max_rule_hits: 4,
        }
    }
}

// ── Lifecycle ──────────────────────────────────────────────────────

/// Confidence assigned to a suggestion per change kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTable {
    pub parameter_substitution: f64,
    pub filter_addition:        f64,
    pub new_rule:               f64,
    /// Added per keyword shared between update and target rule.
    pub overlap_bonus:          f64,
    pub max_overlap_bonus:      f64,
}

/// One keyword → filter mapping used by the change heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTemplate {
    pub keywords:  Vec<String>,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How many recent transactions replay and impact estimation look at.
    pub replay_window:       usize,
    /// Amount thresholds below this are flagged as overly broad.
    pub broad_amount_floor:  f64,
    pub confidence:          ConfidenceTable,
    pub filter_catalogue:    Vec<FilterTemplate>,
    /// Appended when no catalogue entry matches the update text.
    pub fallback_filter:     String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let template = |keywords: &[&str], condition: &str| FilterTemplate {
            keywords:  keywords.iter().map(|k| k.to_string()).collect(),
            condition: condition.to_string(),
        };
        Self {
            replay_window:      500,
            broad_amount_floor: 1_000.0,
            confidence: ConfidenceTable {
                parameter_substitution: 0.80,
                filter_addition:        0.65,
                new_rule:               0.50,
                overlap_bonus:          0.02,
                max_overlap_bonus:      0.10,
            },
            filter_catalogue: vec![
                template(&["travel rule", "originator", "beneficiary information"],
                         "travel_rule_complete == false"),
                template(&["sanction", "ofac", "designation"],
                         "sanctions_status != \"CLEAR\""),
                template(&["politically exposed", "pep"], "pep == true"),
                template(&["virtual asset", "crypto", "vasp"], "virtual_asset_exposure == true"),
                template(&["due diligence", "edd"], "edd_performed == false"),
                template(&["source of wealth"], "source_of_wealth_documented == false"),
                template(&["cash"], "channel == \"cash\""),
                template(&["foreign exchange", "fx", "spread"], "fx_spread_bps > 150"),
                template(&["swift", "wire", "mt103"], "swift_message_type != \"\""),
            ],
            fallback_filter: "counterparty_country in [\"IR\", \"KP\", \"SY\", \"CU\"]".into(),
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeskConfig {
    pub risk:      RiskPolicy,
    pub lifecycle: LifecycleConfig,
}

impl DeskConfig {
    /// Load from the data/ directory.
    /// In tests, use DeskConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let risk_path = format!("{data_dir}/risk/risk_policy.json");
        let risk_content = std::fs::read_to_string(&risk_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {risk_path}: {e}"))?;
        let risk: RiskPolicy = serde_json::from_str(&risk_content)?;

        let lifecycle_path = format!("{data_dir}/lifecycle/lifecycle_config.json");
        let lifecycle_content = std::fs::read_to_string(&lifecycle_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {lifecycle_path}: {e}"))?;
        let lifecycle: LifecycleConfig = serde_json::from_str(&lifecycle_content)?;

        if risk.max_rule_hits == 0 {
            anyhow::bail!("{risk_path}: max_rule_hits must be at least 1");
        }
        if risk.severity.medium > risk.severity.high {
            anyhow::bail!("{risk_path}: medium severity band is above the high band");
        }

        log::info!("Loaded desk config from {data_dir}");
        Ok(Self { risk, lifecycle })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self::default()
    }
}
