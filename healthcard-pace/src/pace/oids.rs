//! Object identifiers relevant to PACE.


use rasn::types::Oid;


macro_rules! pace_oid {
    ($name:ident $(, $number:expr)* $(,)?) => {
        pub const $name: &'static Oid = Oid::const_new(&[0, 4, 0, 127, 0, 7, 2, 2, 4 $(, $number)*]);
    };
}

pace_oid!(PACE_OID_PREFIX);

pace_oid!(PACE_ECDH_GM_AES_CBC_CMAC_128, 2, 2);


/// Whether the object identifier denotes one of the PACE protocol variants.
pub fn is_pace_protocol(oid: &Oid) -> bool {
    oid.len() == PACE_OID_PREFIX.len() + 2
        && oid.starts_with(PACE_OID_PREFIX)
}


/// Whether the PACE protocol variant can be negotiated by this crate.
pub fn is_supported_protocol(oid: &Oid) -> bool {
    oid == PACE_ECDH_GM_AES_CBC_CMAC_128
}
