//! Generator trigger logic
//!
//! A generator fires when its packed-argument count reaches `trigger`, or
//! when `timeout` seconds have passed since the first pack of the current
//! batch and at least one arg is waiting. The threshold path drains
//! `trigger`-sized batches; the timeout path drains whatever is present.

use chrono::{DateTime, Duration, Utc};
use rookery_core::{Generator, GeneratorArg, WorkflowSpec};

use crate::error::EngineError;

/// How many args the next firing should consume, or None when the generator
/// is not due.
pub fn due_batch(generator: &Generator, count: i64, now: DateTime<Utc>) -> Option<usize> {
    if generator.trigger > 0 && count >= generator.trigger {
        return Some(generator.trigger as usize);
    }
    if count > 0 && generator.timeout >= 0 {
        if let Some(first_pack) = generator.first_pack {
            if now - first_pack >= Duration::seconds(generator.timeout) {
                return Some(count as usize);
            }
        }
    }
    None
}

/// Parse a generator's workflow-spec template and append the packed args to
/// every node's argument list, in pack order.
pub fn instantiate_template(
    generator: &Generator,
    args: &[GeneratorArg],
) -> Result<WorkflowSpec, EngineError> {
    let mut spec: WorkflowSpec = serde_json::from_str(&generator.workflow_spec)
        .map_err(|e| EngineError::InvalidArgument(format!("bad workflow spec template: {e}")))?;
    spec.colony_id = generator.colony_id.clone();
    for function_spec in &mut spec.function_specs {
        function_spec
            .args
            .extend(args.iter().map(|a| serde_json::Value::String(a.arg.clone())));
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::{Conditions, FunctionSpec};

    fn generator(trigger: i64, timeout: i64) -> Generator {
        let colony_id = rookery_core::generate_id();
        let mut spec = WorkflowSpec::new(&colony_id);
        spec.add(FunctionSpec::new("process_batch", Conditions::default()).with_node_name("task1"));
        Generator::new(
            colony_id,
            "batcher",
            serde_json::to_string(&spec).unwrap(),
            trigger,
        )
        .with_timeout(timeout)
    }

    #[test]
    fn test_not_due_below_threshold() {
        let generator = generator(3, -1);
        assert_eq!(due_batch(&generator, 0, Utc::now()), None);
        assert_eq!(due_batch(&generator, 2, Utc::now()), None);
    }

    #[test]
    fn test_due_at_threshold_drains_trigger_sized_batch() {
        let generator = generator(3, -1);
        assert_eq!(due_batch(&generator, 3, Utc::now()), Some(3));
        assert_eq!(due_batch(&generator, 7, Utc::now()), Some(3));
    }

    #[test]
    fn test_timeout_drains_partial_batch() {
        let mut generator = generator(10, 5);
        let now = Utc::now();
        generator.first_pack = Some(now - Duration::seconds(6));
        assert_eq!(due_batch(&generator, 4, now), Some(4));
    }

    #[test]
    fn test_timeout_not_elapsed() {
        let mut generator = generator(10, 60);
        let now = Utc::now();
        generator.first_pack = Some(now - Duration::seconds(5));
        assert_eq!(due_batch(&generator, 4, now), None);
    }

    #[test]
    fn test_timeout_with_no_args_never_fires() {
        let mut generator = generator(10, 1);
        generator.first_pack = Some(Utc::now() - Duration::seconds(100));
        assert_eq!(due_batch(&generator, 0, Utc::now()), None);
    }

    #[test]
    fn test_template_instantiation_appends_args() {
        let generator = generator(2, -1);
        let args = vec![
            GeneratorArg::new(&generator.id, &generator.colony_id, "a"),
            GeneratorArg::new(&generator.id, &generator.colony_id, "b"),
        ];
        let spec = instantiate_template(&generator, &args).unwrap();
        assert_eq!(spec.colony_id, generator.colony_id);
        assert_eq!(
            spec.function_specs[0].args,
            vec![serde_json::json!("a"), serde_json::json!("b")]
        );
    }

    #[test]
    fn test_bad_template_rejected() {
        let mut generator = generator(2, -1);
        generator.workflow_spec = "not json".to_string();
        assert!(matches!(
            instantiate_template(&generator, &[]),
            Err(EngineError::InvalidArgument(_))
        ));
    }
}
