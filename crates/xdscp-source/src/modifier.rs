//! Per-instance and global modifiers (section 4.6).

use serde_json::Value;

/// Mutates a single instance in place, iff it matches.
pub trait Modifier: Send + Sync {
    fn matches(&self, instance: &Value) -> bool;
    fn apply(&self, instance: &mut Value);
}

/// Partitions a scope's instance list, transforms the matched partition,
/// and joins it back in place.
pub trait GlobalModifier: Send + Sync {
    fn matches(&self, instance: &Value) -> bool;
    fn apply(&self, matched: &mut Vec<Value>);
}

/// Run global modifiers before per-instance modifiers, insertion order
/// preserved within each kind, over a deep copy of `instances` so the
/// pre-modifier data remains available for re-matching.
#[must_use]
pub fn apply_modifiers(
    instances: &[Value],
    global_modifiers: &[Box<dyn GlobalModifier>],
    modifiers: &[Box<dyn Modifier>],
) -> Vec<Value> {
    let mut working: Vec<Value> = instances.to_vec();

    for gm in global_modifiers {
        let mut matched_idx = Vec::new();
        let mut matched_vals = Vec::new();
        for (i, inst) in working.iter().enumerate() {
            if gm.matches(inst) {
                matched_idx.push(i);
                matched_vals.push(inst.clone());
            }
        }
        gm.apply(&mut matched_vals);
        // The partition may grow or shrink; replace matched positions
        // 1:1 where possible and append/drop the remainder at the end.
        for (slot, idx) in matched_idx.iter().enumerate() {
            if let Some(v) = matched_vals.get(slot) {
                working[*idx] = v.clone();
            }
        }
        if matched_vals.len() > matched_idx.len() {
            working.extend(matched_vals.into_iter().skip(matched_idx.len()));
        }
    }

    for m in modifiers {
        for inst in &mut working {
            if m.matches(inst) {
                m.apply(inst);
            }
        }
    }

    working
}
