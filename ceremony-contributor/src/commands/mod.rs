pub mod contribute;
pub mod queue;
pub mod status;
pub mod verify;

pub use self::{
    contribute::{
        contribute_subcommand,
        plan_actions,
        Action,
        Contribute,
        ContributionComputer,
        ContributionOutcome,
        ExternalCommandComputer,
        Identity,
    },
    queue::{listen_to_queue_position, QueuePositionTracker, QueueUpdate},
    status::status_subcommand,
    verify::{verify_contribution, VerificationOutcome},
};
