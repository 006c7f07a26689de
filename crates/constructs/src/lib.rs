//! Compliant constructs. Each one resolves its effective configuration,
//! materializes the resource and its auxiliaries in a [`Stack`], and registers
//! the kind's validator to run when the stack is synthesized.
//!
//! [`Stack`]: compliant_core::Stack

mod apigateway;
mod backup;
mod dynamodb;
mod lambda;
mod s3;

pub use apigateway::{associate_web_acl, CompliantApiStage, CompliantApiStageProps, CompliantRestApi, CompliantRestApiProps};
pub use backup::BackupHandles;
pub use dynamodb::{CompliantDynamodbTable, CompliantTableProps};
pub use lambda::{CompliantLambda, CompliantLambdaProps};
pub use s3::{CompliantS3, CompliantS3Props};
