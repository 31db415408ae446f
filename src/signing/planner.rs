use serde::Serialize;

use super::models::{InitiativeType, Step};

/// Ordered steps a signer walks through for one initiative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPlan {
    steps: Vec<Step>,
}

impl StepPlan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn first(&self) -> Step {
        // plan() always ends with Finish, so the plan is never empty
        self.steps.first().copied().unwrap_or(Step::Finish)
    }

    pub fn contains(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }

    /// Step following `step`, or `None` when `step` is last or not planned.
    pub fn next_after(&self, step: Step) -> Option<Step> {
        let pos = self.steps.iter().position(|s| *s == step)?;
        self.steps.get(pos + 1).copied()
    }

    /// True when signing needs nothing but the final confirmation.
    pub fn is_single_step(&self) -> bool {
        self.steps == [Step::Finish]
    }
}

pub struct StepPlanner;

impl StepPlanner {
    pub fn plan(initiative_type: &InitiativeType) -> StepPlan {
        let mut steps = Vec::with_capacity(4);
        if initiative_type.collects_extra_fields {
            steps.push(Step::FillPersonalData);
        }
        if initiative_type.requires_sms_verification {
            steps.extend([Step::SmsPhoneNumber, Step::SmsCode]);
        }
        steps.push(Step::Finish);
        StepPlan { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initiative_type(collects_extra_fields: bool, requires_sms_verification: bool) -> InitiativeType {
        InitiativeType {
            id: 1,
            title: "Type".into(),
            collects_extra_fields,
            requires_sms_verification,
            extra_fields_legal_text: String::new(),
        }
    }

    #[test]
    fn plan_with_no_requirements_is_finish_only() {
        let plan = StepPlanner::plan(&initiative_type(false, false));
        assert_eq!(plan.steps(), &[Step::Finish]);
        assert!(plan.is_single_step());
        assert_eq!(plan.first(), Step::Finish);
    }

    #[test]
    fn plan_with_sms_only() {
        let plan = StepPlanner::plan(&initiative_type(false, true));
        assert_eq!(
            plan.steps(),
            &[Step::SmsPhoneNumber, Step::SmsCode, Step::Finish]
        );
    }

    #[test]
    fn plan_with_personal_data_only() {
        let plan = StepPlanner::plan(&initiative_type(true, false));
        assert_eq!(plan.steps(), &[Step::FillPersonalData, Step::Finish]);
        assert_eq!(plan.next_after(Step::FillPersonalData), Some(Step::Finish));
    }

    #[test]
    fn plan_with_everything() {
        let plan = StepPlanner::plan(&initiative_type(true, true));
        assert_eq!(
            plan.steps(),
            &[
                Step::FillPersonalData,
                Step::SmsPhoneNumber,
                Step::SmsCode,
                Step::Finish
            ]
        );
        assert!(!plan.is_single_step());
    }

    #[test]
    fn every_plan_keeps_fixed_order_and_ends_with_finish() {
        for collects in [false, true] {
            for sms in [false, true] {
                let plan = StepPlanner::plan(&initiative_type(collects, sms));
                let steps = plan.steps();
                assert_eq!(steps.last(), Some(&Step::Finish));
                assert!(steps.windows(2).all(|w| w[0] < w[1]));
                assert_eq!(plan.contains(Step::FillPersonalData), collects);
                assert_eq!(plan.contains(Step::SmsPhoneNumber), sms);
                assert_eq!(plan.contains(Step::SmsCode), sms);
            }
        }
    }

    #[test]
    fn next_after_last_or_unplanned_step_is_none() {
        let plan = StepPlanner::plan(&initiative_type(false, true));
        assert_eq!(plan.next_after(Step::Finish), None);
        assert_eq!(plan.next_after(Step::FillPersonalData), None);
        assert_eq!(plan.next_after(Step::SmsCode), Some(Step::Finish));
    }
}
