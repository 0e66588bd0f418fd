use async_trait::async_trait;
use serde_json::{json, Value};

use super::names;
use crate::activity::{Activity, ActivityContext, ActivityResult};

/// Costs nothing and always succeeds. It does not restore energy.
pub struct NapActivity;

#[async_trait]
impl Activity for NapActivity {
    fn name(&self) -> &str {
        names::NAP
    }

    fn description(&self) -> &str {
        "Take a short break"
    }

    fn energy_cost(&self) -> f64 {
        0.0
    }

    fn success_mood(&self) -> &str {
        "rested"
    }

    async fn execute(&self, ctx: &ActivityContext, _params: &Value) -> ActivityResult {
        ActivityResult::success(json!({
            "message": "Took a nap",
            "energy": ctx.energy,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_with_keys;

    #[tokio::test]
    async fn test_nap_always_succeeds_at_zero_energy() {
        let mut ctx = context_with_keys(&[]);
        ctx.energy = 0.0;
        assert!(NapActivity.can_run(&ctx));

        let result = NapActivity.execute(&ctx, &Value::Null).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["energy"], 0.0);
    }
}
