//! Revision Prompt Builder
//!
//! Assembles the plan-revision prompt from the current plan YAML, the raised
//! flags, the computed metrics, and the athlete's goals.

use crate::analytics::{FlagSet, MetricsReport};
use crate::config::GoalConfig;

/// JSON schema for the expected LLM reply: a single `revision` key holding a
/// list of RFC 6902 operations.
pub fn revision_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["revision"],
        "properties": {
            "revision": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["op", "path"],
                    "properties": {
                        "op": {
                            "type": "string",
                            "enum": ["add", "remove", "replace", "move", "copy", "test"]
                        },
                        "path": { "type": "string" },
                        "value": {},
                        "from": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// Build the revision prompt.
///
/// The flags JSON mirrors what gets written to the revision log, so the
/// model and the operator see the same picture.
pub fn build_revision_prompt(
    plan_yaml: &str,
    flags: &FlagSet,
    report: &MetricsReport,
    goals: &GoalConfig,
) -> String {
    let flags_json = serde_json::to_string_pretty(flags).unwrap_or_else(|_| "{}".to_string());
    let metrics_json = serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        "You are revising an endurance athlete's training plan based on recent \
training-load and recovery data.\n\
You will be given the current plan in YAML, the computed metrics, and a set of \
flags indicating concerning trends.\n\
Propose revisions as RFC 6902 JSON Patch operations against the plan document.\n\
\n\
Current training plan (YAML):\n\
```yaml\n{plan_yaml}\n```\n\
\n\
Computed metrics:\n\
```json\n{metrics_json}\n```\n\
\n\
Raised flags:\n\
```json\n{flags_json}\n```\n\
\n\
Guidance:\n\
- If `high_atl_ctl_ratio` or `high_ramp` is true, reduce volume or intensity \
in the coming week.\n\
- If `low_hrv` is true, add a rest day or downgrade the hardest planned session.\n\
- If `low_tsb` is true, prioritize recovery until the balance improves.\n"
    );

    if goals.goal_date.is_some()
        || goals.goal_type.is_some()
        || !goals.available_weekdays.is_empty()
        || !goals.blocked_dates.is_empty()
    {
        prompt.push_str("\nAthlete constraints:\n");
        if let Some(date) = &goals.goal_date {
            prompt.push_str(&format!("- Goal date: {}\n", date));
        }
        if let Some(goal) = &goals.goal_type {
            prompt.push_str(&format!("- Goal event: {}\n", goal));
        }
        if !goals.available_weekdays.is_empty() {
            prompt.push_str(&format!(
                "- Training days: {}\n",
                goals.available_weekdays.join(", ")
            ));
        }
        if !goals.blocked_dates.is_empty() {
            prompt.push_str(&format!(
                "- Blocked dates (no workouts): {}\n",
                goals.blocked_dates.join(", ")
            ));
        }
    }

    prompt.push_str(
        "\nYour response MUST be a JSON object with a single key \"revision\" whose \
value is a list of RFC 6902 JSON Patch operations. Target only paths that exist \
in the plan structure. Do NOT include any other text.\n\
\n\
Example response:\n\
```json\n\
{\n\
  \"revision\": [\n\
    { \"op\": \"replace\", \"path\": \"/workouts/tempo_10k/0/warmup\", \"value\": \"20min @H(z1)\" },\n\
    { \"op\": \"add\", \"path\": \"/schedulePlan/workouts/-\", \"value\": \"rest\" }\n\
  ]\n\
}\n\
```\n",
    );

    prompt
}
