// ABOUTME: Compile-fail test verifying InstanceId and TargetId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use rolling_replacer::types::{InstanceId, TargetId};

fn takes_instance_id(_id: InstanceId) {}

fn main() {
    let target_id = TargetId::new("i-0abc");
    takes_instance_id(target_id); // ERROR: expected InstanceId, found TargetId
}
