use crate::fragment::FragmentationPolicy;
use crate::types::ProtocolVersion;

/// Which DTLS generation the shim drives.
///
/// This selects the record format for protected records: DTLS 1.2
/// connections keep the legacy 13-byte header in every epoch, DTLS 1.3
/// connections switch to the unified header once an epoch above 0 is
/// installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Dtls12,
    Dtls13,
}

/// Shim configuration
#[derive(Clone)]
pub struct Config {
    version: Version,
    wire_version: ProtocolVersion,
    pre_negotiation_alert_version: Option<ProtocolVersion>,
    max_packet: usize,
    flush_every_record: bool,
    mask_sequence_numbers: bool,
    fragmentation: FragmentationPolicy,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            version: Version::Dtls12,
            wire_version: ProtocolVersion::DTLS1_2,
            pre_negotiation_alert_version: None,
            max_packet: 1150,
            flush_every_record: false,
            mask_sequence_numbers: true,
            fragmentation: FragmentationPolicy::default(),
            rng_seed: None,
        }
    }

    /// DTLS generation under test.
    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The protocol version expected (and stamped) on legacy record headers.
    #[inline(always)]
    pub fn wire_version(&self) -> ProtocolVersion {
        self.wire_version
    }

    /// Version expectation for alert records arriving before any version
    /// has been negotiated.
    #[inline(always)]
    pub fn pre_negotiation_alert_version(&self) -> Option<ProtocolVersion> {
        self.pre_negotiation_alert_version
    }

    /// The largest network packet the pending buffer will coalesce into.
    #[inline(always)]
    pub fn max_packet(&self) -> usize {
        self.max_packet
    }

    /// Whether every record is flushed as its own packet.
    #[inline(always)]
    pub fn flush_every_record(&self) -> bool {
        self.flush_every_record
    }

    /// Whether unified-header record numbers are XOR-masked.
    #[inline(always)]
    pub fn mask_sequence_numbers(&self) -> bool {
        self.mask_sequence_numbers
    }

    /// Policy for splitting outbound handshake messages.
    #[inline(always)]
    pub fn fragmentation(&self) -> &FragmentationPolicy {
        &self.fragmentation
    }

    /// Seed for all non-cryptographic randomness.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

/// Builder for shim configuration.
pub struct ConfigBuilder {
    version: Version,
    wire_version: ProtocolVersion,
    pre_negotiation_alert_version: Option<ProtocolVersion>,
    max_packet: usize,
    flush_every_record: bool,
    mask_sequence_numbers: bool,
    fragmentation: FragmentationPolicy,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the DTLS generation under test.
    ///
    /// Defaults to DTLS 1.2.
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the protocol version expected on legacy record headers.
    ///
    /// DTLS 1.3 still stamps the 1.2 version on its plaintext records, so
    /// this defaults to DTLS 1.2 for both generations.
    pub fn wire_version(mut self, version: ProtocolVersion) -> Self {
        self.wire_version = version;
        self
    }

    /// Set the version expectation used for alert records that arrive
    /// before version negotiation has completed.
    ///
    /// When unset, such alerts are checked against the normal wire version.
    pub fn pre_negotiation_alert_version(mut self, version: ProtocolVersion) -> Self {
        self.pre_negotiation_alert_version = Some(version);
        self
    }

    /// Set the largest packet the pending buffer will coalesce into.
    ///
    /// Defaults to 1150.
    pub fn max_packet(mut self, max_packet: usize) -> Self {
        self.max_packet = max_packet;
        self
    }

    /// Flush every record as its own packet.
    ///
    /// Required when the peer is driven with a wire form that omits
    /// explicit lengths and relies on packet boundaries to delimit records.
    /// Defaults to false.
    pub fn flush_every_record(mut self, flush: bool) -> Self {
        self.flush_every_record = flush;
        self
    }

    /// Whether unified-header record numbers are XOR-masked.
    ///
    /// Defaults to true. Masking is always skipped while the null cipher is
    /// installed, regardless of this setting.
    pub fn mask_sequence_numbers(mut self, mask: bool) -> Self {
        self.mask_sequence_numbers = mask;
        self
    }

    /// Set the policy for splitting outbound handshake messages.
    pub fn fragmentation(mut self, policy: FragmentationPolicy) -> Self {
        self.fragmentation = policy;
        self
    }

    /// Seed all non-cryptographic randomness for deterministic runs.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            version: self.version,
            wire_version: self.wire_version,
            pre_negotiation_alert_version: self.pre_negotiation_alert_version,
            max_packet: self.max_packet,
            flush_every_record: self.flush_every_record,
            mask_sequence_numbers: self.mask_sequence_numbers,
            fragmentation: self.fragmentation,
            rng_seed: self.rng_seed,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}
