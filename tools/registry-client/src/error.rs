use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to query manifest for {repo}:{reference}: {source}"))]
    Manifest {
        repo: String,
        reference: String,
        source: reqwest::Error,
    },

    #[snafu(display("registry at {url} returned status {status}"))]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[snafu(display("manifest response for {repo}:{reference} carried no usable digest"))]
    MissingDigest { repo: String, reference: String },

    #[snafu(display("failed to exchange token at {url}: {source}"))]
    TokenExchange { url: String, source: reqwest::Error },

    #[snafu(display("failed to read container auth config at {path}: {source}"))]
    ReadAuthConfig {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse container auth config at {path}: {source}"))]
    ParseAuthConfig {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display("failed to decode basic-auth entry for {host}: {source}"))]
    DecodeAuthEntry {
        host: String,
        source: base64::DecodeError,
    },

    #[snafu(display("could not determine AWS region from ECR host '{host}'"))]
    EcrHostShape { host: String },

    #[snafu(display("failed to obtain ECR authorization token: {source}"))]
    EcrAuth {
        source: aws_sdk_ecr::error::SdkError<
            aws_sdk_ecr::operation::get_authorization_token::GetAuthorizationTokenError,
        >,
    },

    #[snafu(display("ECR returned no authorization data for registry {registry_id}"))]
    EcrNoAuthData { registry_id: String },
}
