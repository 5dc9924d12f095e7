use serde::{Deserialize, Serialize};

/// Quality points per letter grade. A+ and A both map to 4.00; there is no
/// D band in this grading scheme.
pub fn quality_point(grade: &str) -> Option<f64> {
    match grade {
        "A+" | "A" => Some(4.00),
        "A-" => Some(3.67),
        "B+" => Some(3.33),
        "B" => Some(3.00),
        "B-" => Some(2.67),
        "C+" => Some(2.33),
        "C" => Some(2.00),
        "F" => Some(0.00),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEntry {
    pub name: String,
    pub credits: i64,
    pub grade: String,
}

/// Standing carried in from previous semesters, if the student supplied it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorStanding {
    pub cgpa: f64,
    pub completed_credits: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    pub semester_credits: i64,
    pub gpa: f64,
    pub total_credits: i64,
    pub cgpa: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalOutcome {
    /// GPA needed next semester, rounded to two decimals and clamped to
    /// the 0.00..=4.00 grade scale.
    pub required_gpa: f64,
    /// False when the unclamped requirement exceeds 4.00, so the target
    /// cannot be reached in one semester at the planned credit load.
    pub achievable: bool,
}

/// GPA required over `planned_credits` next semester to lift the CGPA from
/// `current` standing to `target_cgpa`.
pub fn required_gpa(
    current: PriorStanding,
    target_cgpa: f64,
    planned_credits: i64,
) -> GoalOutcome {
    let current_points = current.cgpa * current.completed_credits as f64;
    let target_points = target_cgpa * (current.completed_credits + planned_credits) as f64;
    let raw = (target_points - current_points) / planned_credits as f64;

    let rounded = (raw * 100.0).round() / 100.0;
    GoalOutcome {
        required_gpa: rounded.clamp(0.0, 4.0),
        achievable: rounded <= 4.0,
    }
}

/// Weighted-average GPA over the semester's courses, folded into the prior
/// CGPA when one is given. Courses with an unknown grade or zero credits are
/// ignored, matching the calculator form where unfilled rows simply don't
/// count.
pub fn compute_summary(courses: &[CourseEntry], prior: Option<PriorStanding>) -> GpaSummary {
    let mut points = 0.0;
    let mut semester_credits: i64 = 0;
    for course in courses {
        let Some(gp) = quality_point(&course.grade) else {
            continue;
        };
        if course.credits <= 0 {
            continue;
        }
        points += gp * course.credits as f64;
        semester_credits += course.credits;
    }

    let gpa = if semester_credits > 0 {
        points / semester_credits as f64
    } else {
        0.0
    };

    match prior {
        Some(p) if p.completed_credits + semester_credits > 0 => {
            let total_credits = p.completed_credits + semester_credits;
            let overall = p.cgpa * p.completed_credits as f64 + gpa * semester_credits as f64;
            GpaSummary {
                semester_credits,
                gpa,
                total_credits,
                cgpa: overall / total_credits as f64,
            }
        }
        _ => GpaSummary {
            semester_credits,
            gpa,
            total_credits: semester_credits,
            cgpa: gpa,
        },
    }
}
