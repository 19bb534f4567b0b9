/// Distribution of a mortality event count across active assignments.
///
/// The storage adapter calls this inside its locking transaction; the
/// arithmetic lives here so it can be tested without a database.
///
/// Rules:
/// - One assignment: it takes `min(count, population)`.
/// - Several: each takes its proportional floor share, bumped to at least 1
///   when the assignment holds fish; any deficit against the requested count
///   is then handed to assignments with remaining headroom, in order, and
///   any surplus forced by the minimums is clawed back in reverse order.
/// - No assignment ever goes below zero, so the total applied is exactly
///   `min(count, total population)`.
pub fn distribute_mortality(count: i64, assignments: &[(i64, i64)]) -> Vec<(i64, i64)> {
    if count <= 0 || assignments.is_empty() {
        return assignments.iter().map(|(id, _)| (*id, 0)).collect();
    }

    let total_population: i64 = assignments.iter().map(|(_, p)| *p).sum();
    if total_population == 0 {
        return assignments.iter().map(|(id, _)| (*id, 0)).collect();
    }

    if assignments.len() == 1 {
        let (id, population) = assignments[0];
        return vec![(id, count.min(population))];
    }

    let mut portions: Vec<(i64, i64)> = assignments
        .iter()
        .map(|(id, population)| {
            let share = ((*population as f64 / total_population as f64) * count as f64) as i64;
            let share = if *population > 0 { share.max(1) } else { 0 };
            (*id, share.min(*population))
        })
        .collect();

    // Hand out any deficit to assignments that still have headroom.
    let mut remaining = count - portions.iter().map(|(_, p)| *p).sum::<i64>();
    if remaining > 0 {
        for (portion, (_, population)) in portions.iter_mut().zip(assignments.iter()) {
            if remaining <= 0 {
                break;
            }
            let headroom = population - portion.1;
            if headroom > 0 {
                let extra = remaining.min(headroom);
                portion.1 += extra;
                remaining -= extra;
            }
        }
    }

    // The minimum-1 bumps can over-allocate small counts; claw the surplus
    // back in reverse order so the total lands on min(count, population).
    if remaining < 0 {
        let mut surplus = -remaining;
        for (_, portion) in portions.iter_mut().rev() {
            if surplus <= 0 {
                break;
            }
            let give_back = surplus.min(*portion);
            *portion -= give_back;
            surplus -= give_back;
        }
    }

    portions
}
