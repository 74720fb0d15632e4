pub mod joint_state;
pub mod learner;
pub mod merge;
pub mod replica;

pub use joint_state::JointStateChecker;
pub use learner::LearnerChecker;
pub use merge::MergeChecker;
pub use replica::ReplicaChecker;
