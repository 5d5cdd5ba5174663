use std::io::Write;

use crate::outcome::Outcome;

/// Renders a run's outcome for downstream consumers.
pub trait ReportFormat {
    fn write_outcome(&self, outcome: &Outcome, writer: &mut dyn Write) -> std::io::Result<()>;
}

pub struct TextReport;

impl ReportFormat for TextReport {
    fn write_outcome(&self, outcome: &Outcome, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            writer,
            "result: {}",
            if outcome.success { "pass" } else { "fail" }
        )?;
        writeln!(writer, "verdict: {}", outcome.verdict)?;

        for record in &outcome.steps {
            if record.message.is_empty() {
                writeln!(writer, "  {}: {}", record.step, record.status)?;
            } else {
                writeln!(
                    writer,
                    "  {}: {} ({})",
                    record.step, record.status, record.message
                )?;
            }
        }

        if !outcome.warnings.is_empty() {
            writeln!(writer, "warnings:")?;
            for warning in &outcome.warnings {
                writeln!(writer, "  {warning}")?;
            }
        }
        Ok(())
    }
}

pub struct JsonReport;

impl ReportFormat for JsonReport {
    fn write_outcome(&self, outcome: &Outcome, writer: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, outcome)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn ReportFormat> {
    if json {
        Box::new(JsonReport)
    } else {
        Box::new(TextReport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ComplianceVerdict, StepRecord, StepStatus};
    use crate::steps::WorkflowStep;

    fn sample_outcome() -> Outcome {
        Outcome {
            success: false,
            verdict: ComplianceVerdict::Failed,
            steps: vec![
                StepRecord {
                    step: WorkflowStep::CheckCompliance,
                    status: StepStatus::Succeeded,
                    message: String::new(),
                },
            ],
            warnings: vec!["module error: helper.dll".into()],
        }
    }

    #[test]
    fn text_report_lists_result_and_steps() {
        let mut buf = Vec::new();
        TextReport.write_outcome(&sample_outcome(), &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("result: fail"));
        assert!(output.contains("verdict: failed"));
        assert!(output.contains("check_compliance: succeeded"));
        assert!(output.contains("module error: helper.dll"));
    }

    #[test]
    fn text_report_includes_step_messages() {
        let mut outcome = sample_outcome();
        outcome.steps[0].message = "Results Ready".into();
        let mut buf = Vec::new();
        TextReport.write_outcome(&outcome, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("check_compliance: succeeded (Results Ready)"));
    }

    #[test]
    fn json_report_is_valid_json() {
        let mut buf = Vec::new();
        JsonReport.write_outcome(&sample_outcome(), &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["verdict"], "failed");
        assert_eq!(parsed["steps"][0]["step"], "check_compliance");
        assert_eq!(parsed["steps"][0]["status"], "succeeded");
    }

    #[test]
    fn json_report_omits_empty_warnings() {
        let mut outcome = sample_outcome();
        outcome.warnings.clear();
        let mut buf = Vec::new();
        JsonReport.write_outcome(&outcome, &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(parsed.get("warnings").is_none());
    }

    #[test]
    fn factory_selects_format() {
        let mut buf = Vec::new();
        formatter(true)
            .write_outcome(&sample_outcome(), &mut buf)
            .unwrap();
        serde_json::from_slice::<serde_json::Value>(&buf).unwrap();

        let mut buf = Vec::new();
        formatter(false)
            .write_outcome(&sample_outcome(), &mut buf)
            .unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("result: fail"));
    }
}
