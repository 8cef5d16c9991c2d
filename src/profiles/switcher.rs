//! Archive the active subject and activate the one an extraction names.

use crate::profiles::{ExtractedProfile, ProfileExtraction};
use crate::rollover;
use crate::types::{Profile, Snapshot, StockLevel};
use chrono::NaiveDate;

/// Build the snapshot that results from applying `extraction` to `active`.
///
/// - A different, named active subject is archived under its own name,
///   without its own archive.
/// - Re-supplying data for the active subject keeps its inventory, daily
///   counters and the rest of the active snapshot as the basis, and appends
///   its pre-overwrite measurements to the evolution history.
/// - The new subject starts from its archived snapshot if one exists,
///   otherwise from an empty snapshot, so an unrelated subject's plan and
///   inventory never leak across.
///
/// Names are compared after trimming and are case-sensitive: "ana" and
/// "Ana" are different subjects.
pub fn switch_profile(
    active: &Snapshot,
    extraction: ProfileExtraction,
    today: NaiveDate,
) -> Snapshot {
    let incoming = extraction.subject_name.trim().to_string();
    let current = active.subject_name().to_string();
    let same_subject = current == incoming;

    let mut archive = active.profiles.clone();
    if !current.is_empty() && !same_subject {
        archive.insert(current.clone(), active.archived());
        tracing::info!(from = %current, to = %incoming, "archived active subject");
    }

    let basis = if same_subject {
        active.archived()
    } else {
        archive.remove(&incoming).unwrap_or_default()
    };
    // The active subject never appears in its own archive.
    archive.remove(&incoming);

    // Counters stamped for another day must not be carried into today.
    let mut next = rollover::reconcile(&basis, today).unwrap_or(basis);

    if same_subject && active.profile.has_measurements() {
        next.profile
            .evolution
            .push(active.profile.measurements_on(today));
    }

    overlay_profile(&mut next.profile, extraction.profile);
    next.profile.name = incoming;

    next.meal_plan = extraction.meal_plan;
    next.exercise_plan = extraction.exercise_plan;
    if extraction.schedule.is_some() {
        next.schedule = extraction.schedule;
    }

    next.inventory
        .extend(extraction.low_stock.into_iter().map(|mut item| {
            item.level = StockLevel::Low;
            item
        }));

    if extraction.targets.calories.is_some() {
        next.targets.calories = extraction.targets.calories;
    }
    if extraction.targets.water.is_some() {
        next.targets.water = extraction.targets.water;
    }

    next.profiles = archive;
    next.last_update_date = Some(today);
    next
}

/// Replace every profile field the extraction supplies. History is kept.
fn overlay_profile(profile: &mut Profile, extracted: ExtractedProfile) {
    fn set<T>(slot: &mut Option<T>, value: Option<T>) {
        if value.is_some() {
            *slot = value;
        }
    }

    set(&mut profile.professional, extracted.professional);
    set(&mut profile.age, extracted.age);
    set(&mut profile.weight, extracted.weight);
    set(&mut profile.height, extracted.height);
    set(&mut profile.fat, extracted.fat);
    set(&mut profile.waist, extracted.waist);
    set(&mut profile.neck, extracted.neck);
    set(&mut profile.arm, extracted.arm);
    set(&mut profile.blood_type, extracted.blood_type);
    set(&mut profile.allergies, extracted.allergies);
    set(&mut profile.comorbidities, extracted.comorbidities);
    set(&mut profile.goals, extracted.goals);
}
