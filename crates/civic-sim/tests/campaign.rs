use civic_core::config::{MutationConfig, UnrecognizedResponsePolicy};
use civic_sim::oracle::InvariantViolation;
use civic_sim::{CampaignConfig, FaultConfig, replay_seed, run_campaign, run_single_seed};

#[test]
fn default_policies_hold_under_faults() {
    let config = CampaignConfig {
        seed_range: 0..25,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).unwrap();
    assert_eq!(report.seeds_run, 25);
    assert!(report.all_passed(), "failures: {:?}", report.failures);
    assert!(report.interesting_states_reached > 0);
}

#[test]
fn heavy_faults_with_refetch_still_hold() {
    let config = CampaignConfig {
        seed_range: 100..115,
        fault: FaultConfig {
            max_delay_rounds: 5,
            drop_rate_percent: 30,
            unauthorized_rate_percent: 10,
            malformed_rate_percent: 20,
            delta_shape_percent: 50,
        },
        mutation: MutationConfig {
            refetch_after_mutation: true,
            ..MutationConfig::default()
        },
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).unwrap();
    assert!(report.all_passed(), "failures: {:?}", report.failures);
}

#[test]
fn keeping_speculation_on_garbage_is_caught() {
    let config = CampaignConfig {
        seed_range: 0..20,
        refetch_rate_percent: 0,
        fault: FaultConfig {
            max_delay_rounds: 2,
            drop_rate_percent: 0,
            unauthorized_rate_percent: 0,
            malformed_rate_percent: 50,
            delta_shape_percent: 50,
        },
        mutation: MutationConfig {
            unrecognized_response: UnrecognizedResponsePolicy::KeepSpeculative,
            ..MutationConfig::default()
        },
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).unwrap();
    assert!(!report.all_passed());

    let seed = report.first_failure.unwrap();
    let violations = run_single_seed(seed, &config).unwrap().unwrap_err();
    assert!(
        violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::OwnVote { .. }))
    );
}

#[test]
fn replay_matches_campaign_verdict() {
    let config = CampaignConfig {
        seed_range: 3..4,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).unwrap();
    let trace = replay_seed(3, &config).unwrap();
    assert_eq!(trace.oracle.passed, report.all_passed());
    assert!(!trace.result.trace.is_empty());
}
