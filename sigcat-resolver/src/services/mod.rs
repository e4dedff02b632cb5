//! Resolution services
//!
//! Signature lookup, canonical object creation, metadata matching, the
//! provider cache and voting consensus.

pub mod artwork;
pub mod candidates;
pub mod hash_resolver;
pub mod matcher;
pub mod merge;
pub mod object_resolver;
pub mod provider_cache;
pub mod voting;

pub use artwork::ArtworkFetcher;
pub use hash_resolver::ResolvedSignature;
pub use matcher::{MatchOutcome, MetadataMatcher, SweepReport};
pub use merge::{MergeOutcome, MergePlan};
pub use object_resolver::{ObjectResolver, ResolvedObjects};
pub use provider_cache::{Freshness, ProviderCache};
pub use voting::{TallyReport, VotePair, VoteSubmission, VoteTarget, VotingService};
