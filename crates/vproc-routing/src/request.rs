use vproc_domain::Job;

/// Queue options accompanying a `Job` into the Routing Engine (spec
/// §4.E). `customer_tier` is carried through into the decision's `reason`
/// for audit purposes but does not itself gate eligibility — only
/// `required_tier` against a cluster's `identity_tier` does.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    pub job: Job,
    pub customer_tier: u8,
    pub required_tier: u8,
    pub required_region: Option<String>,
    pub allowed_regions: Option<Vec<String>>,
    pub gpu_type: Option<String>,
}
