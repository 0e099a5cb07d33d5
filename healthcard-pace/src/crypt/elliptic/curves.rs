//! Elliptic curves that health cards announce for PACE.
//!
//! The parameters are those of RFC 5639. The standardized domain parameter identifiers are listed
//! in BSI TR-03110 Part 3 Appendix A.2.1.1.


use std::fmt;

use hex_literal::hex;

use crate::crypt::boxed_uint_from_be_slice;
use crate::crypt::elliptic::{AffinePoint, PrimeWeierstrassCurve};


/// A named curve that can be selected through a PACE domain parameter identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NamedCurve {
    BrainpoolP256r1,
    BrainpoolP384r1,
    BrainpoolP512r1,
}
impl NamedCurve {
    /// Maps a standardized domain parameter identifier to its curve.
    pub const fn from_parameter_id(parameter_id: i64) -> Option<Self> {
        match parameter_id {
            13 => Some(Self::BrainpoolP256r1),
            16 => Some(Self::BrainpoolP384r1),
            17 => Some(Self::BrainpoolP512r1),
            _ => None,
        }
    }

    pub const fn parameter_id(&self) -> i64 {
        match self {
            Self::BrainpoolP256r1 => 13,
            Self::BrainpoolP384r1 => 16,
            Self::BrainpoolP512r1 => 17,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::BrainpoolP256r1 => "BrainpoolP256r1",
            Self::BrainpoolP384r1 => "BrainpoolP384r1",
            Self::BrainpoolP512r1 => "BrainpoolP512r1",
        }
    }

    /// Constructs the curve's domain parameters.
    pub fn curve(&self) -> PrimeWeierstrassCurve {
        match self {
            Self::BrainpoolP256r1 => brainpool_p256r1(),
            Self::BrainpoolP384r1 => brainpool_p384r1(),
            Self::BrainpoolP512r1 => brainpool_p512r1(),
        }
    }
}
impl fmt::Display for NamedCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


pub fn brainpool_p256r1() -> PrimeWeierstrassCurve {
    PrimeWeierstrassCurve::new(
        boxed_uint_from_be_slice(&hex!("a9fb57dba1eea9bc3e660a909d838d726e3bf623d52620282013481d1f6e5377")),
        boxed_uint_from_be_slice(&hex!("7d5a0975fc2c3057eef67530417affe7fb8055c126dc5c6ce94a4b44f330b5d9")),
        boxed_uint_from_be_slice(&hex!("26dc5c6ce94a4b44f330b5d9bbd77cbf958416295cf7e1ce6bccdc18ff8c07b6")),
        AffinePoint::new(
            boxed_uint_from_be_slice(&hex!("8bd2aeb9cb7e57cb2c4b482ffc81b7afb9de27e1e3bd23c23a4453bd9ace3262")),
            boxed_uint_from_be_slice(&hex!("547ef835c3dac4fd97f8461a14611dc9c27745132ded8e545c1d54c72f046997")),
        ),
    )
}

pub fn brainpool_p384r1() -> PrimeWeierstrassCurve {
    PrimeWeierstrassCurve::new(
        boxed_uint_from_be_slice(&hex!("8cb91e82a3386d280f5d6f7e50e641df152f7109ed5456b412b1da197fb71123acd3a729901d1a71874700133107ec53")),
        boxed_uint_from_be_slice(&hex!("7bc382c63d8c150c3c72080ace05afa0c2bea28e4fb22787139165efba91f90f8aa5814a503ad4eb04a8c7dd22ce2826")),
        boxed_uint_from_be_slice(&hex!("04a8c7dd22ce28268b39b55416f0447c2fb77de107dcd2a62e880ea53eeb62d57cb4390295dbc9943ab78696fa504c11")),
        AffinePoint::new(
            boxed_uint_from_be_slice(&hex!("1d1c64f068cf45ffa2a63a81b7c13f6b8847a3e77ef14fe3db7fcafe0cbd10e8e826e03436d646aaef87b2e247d4af1e")),
            boxed_uint_from_be_slice(&hex!("8abe1d7520f9c2a45cb1eb8e95cfd55262b70b29feec5864e19c054ff99129280e4646217791811142820341263c5315")),
        ),
    )
}

pub fn brainpool_p512r1() -> PrimeWeierstrassCurve {
    PrimeWeierstrassCurve::new(
        boxed_uint_from_be_slice(&hex!("aadd9db8dbe9c48b3fd4e6ae33c9fc07cb308db3b3c9d20ed6639cca703308717d4d9b009bc66842aecda12ae6a380e62881ff2f2d82c68528aa6056583a48f3")),
        boxed_uint_from_be_slice(&hex!("7830a3318b603b89e2327145ac234cc594cbdd8d3df91610a83441caea9863bc2ded5d5aa8253aa10a2ef1c98b9ac8b57f1117a72bf2c7b9e7c1ac4d77fc94ca")),
        boxed_uint_from_be_slice(&hex!("3df91610a83441caea9863bc2ded5d5aa8253aa10a2ef1c98b9ac8b57f1117a72bf2c7b9e7c1ac4d77fc94cadc083e67984050b75ebae5dd2809bd638016f723")),
        AffinePoint::new(
            boxed_uint_from_be_slice(&hex!("81aee4bdd82ed9645a21322e9c4c6a9385ed9f70b5d916c1b43b62eef4d0098eff3b1f78e2d0d48d50d1687b93b97d5f7c6d5047406a5e688b352209bcb9f822")),
            boxed_uint_from_be_slice(&hex!("7dde385d566332ecc0eabfa9cf7822fdf209f70024a57b1aa000c55b881f8111b2dcde494a5f485e5bca4bd88a2763aed1ca2b2fa8f0540678cd1e0f3ad80892")),
        ),
    )
}
