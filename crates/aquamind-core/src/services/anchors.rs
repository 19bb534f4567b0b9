use crate::domain::{Anchor, AnchorKind};
use crate::ports::ObservationRepository;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

/// Collects weight anchors for an (assignment, window) from the three
/// measurement sources and resolves collisions by priority.
///
/// Priority 1: growth samples. Priority 2: completed transfers out with a
/// measured weight, corrected for the grading-selection bias. Priority 3:
/// treatment weighings. When two anchors land on the same date the lower
/// priority number (more trusted measurement) wins.
pub struct AnchorSetBuilder {
    observations: Arc<dyn ObservationRepository>,
}

impl AnchorSetBuilder {
    pub fn new(observations: Arc<dyn ObservationRepository>) -> Self {
        Self { observations }
    }

    pub async fn build(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, Anchor>> {
        let mut anchors: HashMap<NaiveDate, Anchor> = HashMap::new();

        let samples = self
            .observations
            .growth_samples(assignment_id, start, end)
            .await?;
        for sample in samples {
            if let Some(weight) = sample.avg_weight_g {
                insert_if_stronger(
                    &mut anchors,
                    sample.sample_date,
                    Anchor {
                        kind: AnchorKind::GrowthSample,
                        weight_g: weight,
                        confidence: AnchorKind::GrowthSample.confidence(),
                    },
                );
            }
        }

        let transfers = self
            .observations
            .completed_transfers_out(assignment_id, start, end)
            .await?;
        for transfer in transfers {
            let (Some(date), Some(measured)) =
                (transfer.actual_execution_date, transfer.measured_avg_weight_g)
            else {
                continue;
            };
            let bias = transfer
                .selection_method
                .map(|m| m.bias_factor())
                .unwrap_or(1.0);
            insert_if_stronger(
                &mut anchors,
                date,
                Anchor {
                    kind: AnchorKind::Transfer,
                    weight_g: measured * bias,
                    confidence: AnchorKind::Transfer.confidence(),
                },
            );
        }

        let weighings = self
            .observations
            .treatment_weighings(assignment_id, start, end)
            .await?;
        for (date, weight) in weighings {
            insert_if_stronger(
                &mut anchors,
                date,
                Anchor {
                    kind: AnchorKind::Vaccination,
                    weight_g: weight,
                    confidence: AnchorKind::Vaccination.confidence(),
                },
            );
        }

        Ok(anchors)
    }
}

fn insert_if_stronger(anchors: &mut HashMap<NaiveDate, Anchor>, date: NaiveDate, anchor: Anchor) {
    match anchors.get(&date) {
        Some(existing) if existing.kind.priority() <= anchor.kind.priority() => {}
        _ => {
            anchors.insert(date, anchor);
        }
    }
}
