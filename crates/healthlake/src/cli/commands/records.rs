use crate::cli::{print_json, OutputFormat};
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Print e1RM progression per exercise, marking new personal records
pub fn personal_records(pipeline: &Pipeline, exercise: Option<String>, format: OutputFormat) -> Result<()> {
    let records = pipeline.personal_records(exercise.as_deref())?;

    if format == OutputFormat::Json {
        return print_json(&records);
    }

    if records.is_empty() {
        match exercise {
            Some(name) => println!("No sessions found for '{}'", name),
            None => println!("No exercise sessions found"),
        }
        return Ok(());
    }

    println!(
        "{:<28} {:<12} {:>9} {:>9} {:>8} {:>3}",
        "Exercise", "Date", "e1RM", "Best", "Delta", "PR"
    );
    println!("{}", "-".repeat(74));

    let mut current = "";
    for r in &records {
        let name = if r.exercise == current { "" } else { r.exercise.as_str() };
        current = r.exercise.as_str();

        let delta = r
            .delta_kg
            .map(|d| format!("{:+.1}", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:<12} {:>9.1} {:>9.1} {:>8} {:>3}",
            truncate(name, 28),
            r.date.to_string(),
            r.e1rm_kg,
            r.running_max_kg,
            delta,
            if r.is_new_record { "*" } else { "" }
        );
    }

    let prs = records.iter().filter(|r| r.is_new_record).count();
    println!("{}", "-".repeat(74));
    println!("{} sessions, {} personal records", records.len(), prs);

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 3).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Squat", 28), "Squat");
        assert_eq!(truncate("Bench Press (Dumbbell)", 10), "Bench P...");
    }
}
