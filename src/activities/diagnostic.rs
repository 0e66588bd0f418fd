use async_trait::async_trait;
use serde_json::{json, Value};

use super::names;
use crate::activity::{Activity, ActivityContext, ActivityResult};

/// Free, credential-less activity used to check the loop end to end
pub struct TestActivity;

#[async_trait]
impl Activity for TestActivity {
    fn name(&self) -> &str {
        names::TEST
    }

    fn description(&self) -> &str {
        "Echo parameters and current state for diagnostics"
    }

    fn energy_cost(&self) -> f64 {
        0.0
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        ActivityResult::success(json!({
            "params": params,
            "energy": ctx.energy,
            "mood": ctx.mood,
        }))
    }
}
