#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use tau_reward_metrics::reduce;
use tau_reward_types::{ExtraSlot, RewardValue};

fuzz_target!(|data: &[u8]| {
    let Ok(serde_json::Value::Object(entries)) = serde_json::from_slice::<serde_json::Value>(data)
    else {
        return;
    };
    let extras = entries
        .into_iter()
        .map(|(name, value)| {
            let slots = match RewardValue::from(value) {
                RewardValue::List(items) => items.into_iter().map(ExtraSlot::Reported).collect(),
                RewardValue::Null => vec![ExtraSlot::NotReported],
                other => vec![ExtraSlot::Reported(other)],
            };
            (name, slots)
        })
        .collect::<BTreeMap<String, Vec<ExtraSlot>>>();

    let first = reduce(&extras, "reward");
    let second = reduce(&extras, "reward");
    assert!(first.keys().eq(second.keys()));
    for (key, value) in &first {
        assert!(key.starts_with("reward/"));
        assert!(value.is_finite());
        assert_eq!(value.to_bits(), second[key].to_bits());
    }
});
