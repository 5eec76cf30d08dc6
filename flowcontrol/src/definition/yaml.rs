//! Serde view of the parts of a pipeline definition that matter to barriers.
//!
//! Unknown keys are ignored everywhere; only structure that barrier
//! discovery walks through is typed.

use serde::Deserialize;

/// Step type of a barrier step.
pub const BARRIER_STEP_TYPE: &str = "Barrier";

#[derive(Debug, Deserialize)]
pub(crate) struct PipelineDocument {
    pub pipeline: PipelineNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipelineNode {
    #[serde(default)]
    pub flow_control: Option<FlowControlNode>,
    #[serde(default)]
    pub stages: Vec<StageElement>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FlowControlNode {
    #[serde(default)]
    pub barriers: Vec<BarrierNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BarrierNode {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StageElement {
    #[serde(default)]
    pub stage: Option<StageNode>,
    #[serde(default)]
    pub parallel: Option<Vec<StageElement>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StageNode {
    pub identifier: String,
    #[serde(default, rename = "__uuid")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub strategy: Option<serde_yaml::Value>,
    #[serde(default)]
    pub spec: Option<StageSpecNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StageSpecNode {
    #[serde(default)]
    pub execution: Option<ExecutionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecutionNode {
    #[serde(default)]
    pub steps: Vec<StepElement>,
    #[serde(default)]
    pub rollback_steps: Vec<StepElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StepElement {
    #[serde(default)]
    pub step: Option<StepNode>,
    #[serde(default)]
    pub step_group: Option<StepGroupNode>,
    #[serde(default)]
    pub parallel: Option<Vec<StepElement>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StepGroupNode {
    pub identifier: String,
    #[serde(default, rename = "__uuid")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub strategy: Option<serde_yaml::Value>,
    #[serde(default)]
    pub steps: Vec<StepElement>,
    #[serde(default)]
    pub rollback_steps: Vec<StepElement>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StepNode {
    pub identifier: String,
    #[serde(default, rename = "__uuid")]
    pub uuid: Option<String>,
    #[serde(default, rename = "type")]
    pub step_type: Option<String>,
    #[serde(default)]
    pub strategy: Option<serde_yaml::Value>,
    #[serde(default)]
    pub spec: Option<serde_yaml::Value>,
}

impl StageNode {
    pub fn setup_id(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.identifier)
    }
}

impl StepGroupNode {
    pub fn setup_id(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.identifier)
    }
}

impl StepNode {
    pub fn setup_id(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.identifier)
    }

    pub fn is_barrier(&self) -> bool {
        self.step_type.as_deref() == Some(BARRIER_STEP_TYPE)
    }

    pub fn barrier_ref(&self) -> Option<&str> {
        self.spec.as_ref()?.get("barrierRef")?.as_str()
    }
}

/// Setup id of a strategy block, if the node is a strategy root.
pub(crate) fn strategy_setup_id(strategy: Option<&serde_yaml::Value>, node_setup_id: &str) -> Option<String> {
    let strategy = strategy.filter(|value| !value.is_null())?;
    let uuid = strategy
        .get("__uuid")
        .and_then(serde_yaml::Value::as_str)
        .map(ToString::to_string);
    Some(uuid.unwrap_or_else(|| format!("{node_setup_id}_strategy")))
}
