//! End-to-end exercise of the CPU side of the query pipeline: depth-ordered
//! batch selection, deferred consumption, and visibility toggling across
//! simulated frames. No GPU device involved.

use cullfield::camera::Camera;
use cullfield::occlusion::QueryTracker;
use cullfield::scene::SphereField;

/// Build the batch the renderer would issue this frame: depth order filtered
/// down to spheres with no query in flight.
fn select_batch(field: &SphereField, camera: &Camera, tracker: &QueryTracker) -> Vec<usize> {
    field
        .depth_order(&camera.view_matrix())
        .into_iter()
        .filter(|&i| tracker.can_issue(i))
        .collect()
}

#[test]
fn full_frame_cycle_hides_and_reveals() {
    let mut field = SphereField::grid(4);
    let camera = Camera::field_view(16.0 / 9.0);
    let mut tracker = QueryTracker::new(field.len());

    // Frame 0: first frame issues nothing (no depth history), everything drawn.
    assert_eq!(tracker.occluded_count(), 0);

    // Frame 1: all 16 spheres get queries.
    field.advance();
    let batch = select_batch(&field, &camera, &tracker);
    assert_eq!(batch.len(), field.len());
    for &i in &batch {
        tracker.mark_issued(i);
    }

    // Frame 2: results still pending, nothing new to issue.
    field.advance();
    assert!(select_batch(&field, &camera, &tracker).is_empty());

    // Frame 3: results arrive; pretend the back half of the field was hidden.
    let samples: Vec<u64> = (0..batch.len())
        .map(|slot| if slot < batch.len() / 2 { 64 } else { 0 })
        .collect();
    let summary = tracker.consume(&batch, &samples);
    assert_eq!(summary.consumed, 16);
    assert_eq!(summary.newly_occluded, 8);
    assert_eq!(tracker.occluded_count(), 8);

    // Occluded spheres are skipped by the main pass but still get re-queried.
    let requery = select_batch(&field, &camera, &tracker);
    assert_eq!(requery.len(), 16);
    let occluded_in_batch = requery.iter().filter(|&&i| tracker.is_occluded(i)).count();
    assert_eq!(occluded_in_batch, 8);

    // Frame 4: the camera moved, every sphere reports samples again.
    for &i in &requery {
        tracker.mark_issued(i);
    }
    let all_visible: Vec<u64> = vec![1; requery.len()];
    let summary = tracker.consume(&requery, &all_visible);
    assert_eq!(summary.newly_visible, 8);
    assert_eq!(tracker.occluded_count(), 0);
}

#[test]
fn nearest_sphere_is_queried_first() {
    let field = SphereField::grid(6);
    let camera = Camera::field_view(1.0);
    let tracker = QueryTracker::new(field.len());

    let batch = select_batch(&field, &camera, &tracker);
    let view = camera.view_matrix();
    let depth =
        |i: usize| view.transform_point3(field.spheres()[i].position).z;

    // The head of the batch must be at least as near as the tail.
    assert!(depth(batch[0]) >= depth(*batch.last().unwrap()));
}

#[test]
fn staggered_batches_touch_disjoint_spheres() {
    let field = SphereField::grid(3);
    let camera = Camera::field_view(1.0);
    let mut tracker = QueryTracker::new(field.len());

    // First batch covers a third of the field before the readback stalls.
    let full_order = select_batch(&field, &camera, &tracker);
    let first: Vec<usize> = full_order.iter().copied().take(3).collect();
    for &i in &first {
        tracker.mark_issued(i);
    }

    // Second batch picks up everything the first did not cover.
    let second = select_batch(&field, &camera, &tracker);
    assert_eq!(second.len(), field.len() - first.len());
    for i in &first {
        assert!(!second.contains(i));
    }

    // Consuming the batches out of order is fine: they are disjoint.
    for &i in &second {
        tracker.mark_issued(i);
    }
    tracker.consume(&second, &vec![0; second.len()]);
    tracker.consume(&first, &vec![1; first.len()]);
    assert_eq!(tracker.occluded_count(), second.len());
    assert_eq!(tracker.in_flight_count(), 0);
}
