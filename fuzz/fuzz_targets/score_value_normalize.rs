#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_reward_scoring::normalize_score_value;
use tau_reward_types::{CanonicalRecord, RewardValue, MAIN_SCORE_KEY};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if let Ok(result) = normalize_score_value(RewardValue::from(raw)) {
        let record = CanonicalRecord::from(result);
        assert!(record.main_score.is_finite());
        assert!(!record.extras.contains_key(MAIN_SCORE_KEY));
    }
});
