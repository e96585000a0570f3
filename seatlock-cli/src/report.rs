use crate::RunSummary;

/// Human-readable summary printed at the end of a run: one line per
/// successful claim, the seats left on the trip, then the total wall-clock time.
pub fn render(summary: &RunSummary) -> String {
    let mut out = String::new();
    for (requester, seat) in summary.report.claimed() {
        out.push_str(&format!(
            "{} seat assigned to {} [{}]\n",
            seat.name, requester.name, requester.id
        ));
    }
    if let Some(availability) = summary.availability {
        out.push_str(&format!(
            "Trip {}: {} of {} seats unclaimed\n",
            summary.trip_id, availability.unclaimed, availability.total
        ));
    }
    out.push_str(&format!("Total time taken: {:?}\n", summary.report.elapsed));
    out
}
