//! Elliptic-curve cryptography.


pub mod curves;


use std::fmt;
use std::ops::{Add, Mul};

use crypto_bigint::{BoxedUint, Integer, Odd};
use crypto_bigint::modular::{BoxedMontyForm, BoxedMontyParams};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq, CtOption};
use zeroize::Zeroizing;
use zeroize_derive::ZeroizeOnDrop;

use crate::crypt::boxed_uint_with_precision;


/// Marker byte of the uncompressed point encoding.
const UNCOMPRESSED: u8 = 0x04;


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PointError {
    NotUncompressed { first_byte: Option<u8> },
    Length { expected: usize, obtained: usize },
}
impl fmt::Display for PointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUncompressed { first_byte: Some(b) }
                => write!(f, "point encoding starts with 0x{:02X} instead of 0x04", b),
            Self::NotUncompressed { first_byte: None }
                => write!(f, "point encoding is empty"),
            Self::Length { expected, obtained }
                => write!(f, "point encoding has {} bytes, expected {}", obtained, expected),
        }
    }
}
impl std::error::Error for PointError {
}


/// A point in affine coordinates.
#[derive(Clone, Debug, Eq, PartialEq, ZeroizeOnDrop)]
pub struct AffinePoint {
    x: BoxedUint,
    y: BoxedUint,
}
impl AffinePoint {
    pub const fn new(x: BoxedUint, y: BoxedUint) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> &BoxedUint { &self.x }
    pub fn y(&self) -> &BoxedUint { &self.y }

    /// Encodes the point as `0x04 || X || Y` with each coordinate left-padded to `field_len` bytes.
    pub fn to_uncompressed(&self, field_len: usize) -> Zeroizing<Vec<u8>> {
        let mut ret = Zeroizing::new(Vec::with_capacity(1 + 2*field_len));
        ret.push(UNCOMPRESSED);
        ret.extend(&*fixed_width_be_bytes(&self.x, field_len));
        ret.extend(&*fixed_width_be_bytes(&self.y, field_len));
        ret
    }

    /// Decodes a point from `0x04 || X || Y` where both coordinates are `field_len` bytes long.
    ///
    /// The coordinates are given `bits_precision` bits of precision. Whether the point is actually
    /// on a curve is not checked.
    pub fn try_from_uncompressed(bytes: &[u8], field_len: usize, bits_precision: u32) -> Result<Self, PointError> {
        match bytes.first() {
            Some(&UNCOMPRESSED) => {},
            other => return Err(PointError::NotUncompressed { first_byte: other.copied() }),
        }
        let expected = 1 + 2*field_len;
        if bytes.len() != expected {
            return Err(PointError::Length { expected, obtained: bytes.len() });
        }

        let (x_bytes, y_bytes) = bytes[1..].split_at(field_len);
        let length_error = PointError::Length { expected, obtained: bytes.len() };
        let x = boxed_uint_with_precision(x_bytes, bits_precision)
            .ok_or(length_error)?;
        let y = boxed_uint_with_precision(y_bytes, bits_precision)
            .ok_or(length_error)?;
        Ok(Self { x, y })
    }
}


/// Encodes an unsigned integer big-endian in exactly `len` bytes.
///
/// Panics if the value does not fit.
pub fn fixed_width_be_bytes(value: &BoxedUint, len: usize) -> Zeroizing<Vec<u8>> {
    let bytes = Zeroizing::new(value.to_be_bytes());
    let leading_zeroes = bytes.iter()
        .take_while(|b| **b == 0x00)
        .count();
    let significant = &bytes[leading_zeroes..];
    assert!(significant.len() <= len, "value does not fit into {} bytes", len);

    let mut ret = Zeroizing::new(vec![0u8; len]);
    ret[len - significant.len()..].copy_from_slice(significant);
    ret
}


/// A point in projective coordinates in Montgomery form.
#[derive(Clone, Debug)]
struct MontyProjectivePoint {
    x: BoxedMontyForm,
    y: BoxedMontyForm,
    z: BoxedMontyForm,
}

#[derive(Clone, Debug)]
struct MontyKnowledge {
    params: BoxedMontyParams,
    bits_precision: u32,
    a: BoxedMontyForm,
    b: BoxedMontyForm,
    b3: BoxedMontyForm,
}


/// An elliptic curve of the form `y**2 ≡ x**3 + ax + b` modulo a prime number.
///
/// All curves used here have a cofactor of 1.
#[derive(Clone, Debug, Eq, PartialEq, ZeroizeOnDrop)]
pub struct PrimeWeierstrassCurve {
    /// The prime (modulus) of the curve.
    prime: BoxedUint,

    /// Coefficient `a` in the curve's formula.
    coefficient_a: BoxedUint,

    /// Coefficient `b` in the curve's formula.
    coefficient_b: BoxedUint,

    /// The coordinates of the generator point of the curve.
    generator: AffinePoint,
}
impl PrimeWeierstrassCurve {
    pub fn new(
        prime: BoxedUint,
        coefficient_a: BoxedUint,
        coefficient_b: BoxedUint,
        generator: AffinePoint,
    ) -> Self {
        if !bool::from(prime.is_odd()) {
            panic!("prime is not odd");
        }

        let curve = Self {
            prime,
            coefficient_a,
            coefficient_b,
            generator,
        };
        if !bool::from(curve.is_on_curve_affine(&curve.generator)) {
            panic!("generator is not on curve");
        }
        curve
    }

    pub fn prime(&self) -> &BoxedUint { &self.prime }
    pub fn coefficient_a(&self) -> &BoxedUint { &self.coefficient_a }
    pub fn coefficient_b(&self) -> &BoxedUint { &self.coefficient_b }
    pub fn generator(&self) -> &AffinePoint { &self.generator }

    /// The number of bytes needed to represent a field element (and thereby a private key).
    pub fn field_size_bytes(&self) -> usize {
        let bits = usize::try_from(self.prime.bits())
            .expect("bit count fits into usize");
        (bits + 7) / 8
    }

    /// Encodes a point on this curve in uncompressed form.
    pub fn encode_point(&self, point: &AffinePoint) -> Zeroizing<Vec<u8>> {
        point.to_uncompressed(self.field_size_bytes())
    }

    /// Decodes an uncompressed point for use with this curve.
    ///
    /// Only the encoding is checked; use [`Self::is_on_curve_affine`] to validate the point.
    pub fn decode_point(&self, bytes: &[u8]) -> Result<AffinePoint, PointError> {
        AffinePoint::try_from_uncompressed(bytes, self.field_size_bytes(), self.prime.bits_precision())
    }

    /// Returns important curve parameters for operations in Montgomery form.
    fn monty_knowledge(&self) -> MontyKnowledge {
        let odd_prime: Option<Odd<BoxedUint>> = self.prime.to_odd().into();
        let odd_prime = odd_prime.expect("prime is odd");
        let params = BoxedMontyParams::new(odd_prime);
        let bits_precision = self.prime.bits_precision();
        let a = BoxedMontyForm::new(self.coefficient_a.clone(), params.clone());
        let b = BoxedMontyForm::new(self.coefficient_b.clone(), params.clone());
        let b3 = (&b).add(&b).add(&b);
        MontyKnowledge { params, bits_precision, a, b, b3 }
    }

    fn internal_is_on_curve(monty: &MontyKnowledge, point: &MontyProjectivePoint) -> Choice {
        let inverse_option = point.z.invert();
        let has_inverse = inverse_option.is_some();
        let inverse: Option<BoxedMontyForm> = inverse_option.into();
        let inverse = inverse.unwrap_or_else(|| point.z.clone());

        let x = (&point.x).mul(&inverse);
        let y = (&point.y).mul(&inverse);

        let y_squared = (&y).mul(&y);
        let x_cubed = (&x).mul(&x).mul(&x);
        let ax = (&x).mul(&monty.a);
        let rhs = (&x_cubed).add(&ax).add(&monty.b);
        let are_equal = y_squared.retrieve().ct_eq(&rhs.retrieve());
        Choice::conditional_select(&Choice::from(0), &are_equal, has_inverse)
    }

    fn internal_affine_to_monty_projective(monty: &MontyKnowledge, point: &AffinePoint) -> MontyProjectivePoint {
        let x = BoxedMontyForm::new(Self::with_field_precision(monty, &point.x), monty.params.clone());
        let y = BoxedMontyForm::new(Self::with_field_precision(monty, &point.y), monty.params.clone());
        let z = BoxedMontyForm::one(monty.params.clone());
        MontyProjectivePoint { x, y, z }
    }

    fn with_field_precision(monty: &MontyKnowledge, value: &BoxedUint) -> BoxedUint {
        if value.bits_precision() == monty.bits_precision {
            return value.clone();
        }
        let bytes = Zeroizing::new(value.to_be_bytes());
        boxed_uint_with_precision(&bytes, monty.bits_precision)
            .expect("coordinate exceeds field size")
    }

    fn internal_monty_projective_to_affine(point: &MontyProjectivePoint) -> CtOption<AffinePoint> {
        let inverse_option = point.z.invert();
        let has_inverse = inverse_option.is_some();
        let inverse: Option<BoxedMontyForm> = inverse_option.into();
        let inverse = inverse.unwrap_or_else(|| point.z.clone());

        let x = (&point.x).mul(&inverse);
        let y = (&point.y).mul(&inverse);

        CtOption::new(AffinePoint::new(x.retrieve(), y.retrieve()), has_inverse)
    }

    fn internal_double_point(monty: &MontyKnowledge, point: &MontyProjectivePoint) -> MontyProjectivePoint {
        // Renes/Costello/Batina 2015 (https://eprint.iacr.org/2015/1060), Algorithm 3
        let (x, y, z) = (&point.x, &point.y, &point.z);

        let mut t0 = x.mul(x);
        let t1 = y.mul(y);
        let mut t2 = z.mul(z);
        let mut t3 = x.mul(y);
        t3 = (&t3).add(&t3);
        let mut z3 = x.mul(z);
        z3 = (&z3).add(&z3);
        let mut x3 = (&monty.a).mul(&z3);
        let mut y3 = (&monty.b3).mul(&t2);
        y3 = (&x3).add(&y3);
        x3 = (&t1).sub(&y3);
        y3 = (&t1).add(&y3);
        y3 = (&x3).mul(&y3);
        x3 = (&t3).mul(&x3);
        z3 = (&monty.b3).mul(&z3);
        t2 = (&monty.a).mul(&t2);
        t3 = (&t0).sub(&t2);
        t3 = (&monty.a).mul(&t3);
        t3 = (&t3).add(&z3);
        z3 = (&t0).add(&t0);
        t0 = (&z3).add(&t0);
        t0 = (&t0).add(&t2);
        t0 = (&t0).mul(&t3);
        y3 = (&y3).add(&t0);
        t2 = y.mul(z);
        t2 = (&t2).add(&t2);
        t0 = (&t2).mul(&t3);
        x3 = (&x3).sub(&t0);
        z3 = (&t2).mul(&t1);
        z3 = (&z3).add(&z3);
        z3 = (&z3).add(&z3);

        MontyProjectivePoint { x: x3, y: y3, z: z3 }
    }

    fn internal_add_points(monty: &MontyKnowledge, lhs: &MontyProjectivePoint, rhs: &MontyProjectivePoint) -> MontyProjectivePoint {
        // Renes/Costello/Batina 2015 (https://eprint.iacr.org/2015/1060), Algorithm 1
        let (x1, y1, z1) = (&lhs.x, &lhs.y, &lhs.z);
        let (x2, y2, z2) = (&rhs.x, &rhs.y, &rhs.z);

        let mut t0 = x1.mul(x2);
        let mut t1 = y1.mul(y2);
        let mut t2 = z1.mul(z2);
        let mut t3 = x1.add(y1);
        let mut t4 = x2.add(y2);
        t3 = (&t3).mul(&t4);
        t4 = (&t0).add(&t1);
        t3 = (&t3).sub(&t4);
        t4 = x1.add(z1);
        let mut t5 = x2.add(z2);
        t4 = (&t4).mul(&t5);
        t5 = (&t0).add(&t2);
        t4 = (&t4).sub(&t5);
        t5 = y1.add(z1);
        let mut x3 = y2.add(z2);
        t5 = (&t5).mul(&x3);
        x3 = (&t1).add(&t2);
        t5 = (&t5).sub(&x3);
        let mut z3 = (&monty.a).mul(&t4);
        x3 = (&monty.b3).mul(&t2);
        z3 = (&x3).add(&z3);
        x3 = (&t1).sub(&z3);
        z3 = (&t1).add(&z3);
        let mut y3 = (&x3).mul(&z3);
        t1 = (&t0).add(&t0);
        t1 = (&t1).add(&t0);
        t2 = (&monty.a).mul(&t2);
        t4 = (&monty.b3).mul(&t4);
        t1 = (&t1).add(&t2);
        t2 = (&t0).sub(&t2);
        t2 = (&monty.a).mul(&t2);
        t4 = (&t4).add(&t2);
        t0 = (&t1).mul(&t4);
        y3 = (&y3).add(&t0);
        t0 = (&t5).mul(&t4);
        x3 = (&t3).mul(&x3);
        x3 = (&x3).sub(&t0);
        t0 = (&t3).mul(&t1);
        z3 = (&t5).mul(&z3);
        z3 = (&z3).add(&t0);

        MontyProjectivePoint { x: x3, y: y3, z: z3 }
    }

    fn internal_point_at_infinity(monty: &MontyKnowledge) -> MontyProjectivePoint {
        MontyProjectivePoint {
            x: BoxedMontyForm::zero(monty.params.clone()),
            y: BoxedMontyForm::one(monty.params.clone()),
            z: BoxedMontyForm::zero(monty.params.clone()),
        }
    }

    fn internal_multiply_scalar_with_point(monty: &MontyKnowledge, scalar: &BoxedUint, point: &MontyProjectivePoint) -> MontyProjectivePoint {
        // double-and-add over the full precision of the scalar, not just up to its highest set bit;
        // the add is computed every round but still kept or discarded by branching on the bit
        let mut result = Self::internal_point_at_infinity(monty);
        let mut double_me = point.clone();
        for i in 0..scalar.bits_precision() {
            let sum = Self::internal_add_points(monty, &result, &double_me);
            if bool::from(scalar.bit(i)) {
                result = sum;
            }
            double_me = Self::internal_double_point(monty, &double_me);
        }
        result
    }

    /// Checks whether the point lies on this curve.
    ///
    /// Coordinates outside of the field are rejected as well.
    pub fn is_on_curve_affine(&self, point: &AffinePoint) -> Choice {
        let monty = self.monty_knowledge();
        if point.x.bits() > self.prime.bits() || point.y.bits() > self.prime.bits() {
            return Choice::from(0);
        }
        let x = Self::with_field_precision(&monty, &point.x);
        let y = Self::with_field_precision(&monty, &point.y);
        if x >= self.prime || y >= self.prime {
            return Choice::from(0);
        }
        let projective = Self::internal_affine_to_monty_projective(&monty, point);
        Self::internal_is_on_curve(&monty, &projective)
    }

    /// Calculates a public key from a private key.
    ///
    /// Returns none if the result is the point at infinity.
    pub fn calculate_public_key(&self, private_key: &BoxedUint) -> CtOption<AffinePoint> {
        // public_key = private_key * generator
        let monty = self.monty_knowledge();
        let generator = Self::internal_affine_to_monty_projective(&monty, &self.generator);
        let product = Self::internal_multiply_scalar_with_point(&monty, private_key, &generator);
        Self::internal_monty_projective_to_affine(&product)
    }

    /// Multiplies the other party's public key with our private key.
    ///
    /// Returns none if the other public key is not on the curve or the result is the point at
    /// infinity.
    pub fn diffie_hellman(&self, private_key: &BoxedUint, other_public_key: &AffinePoint) -> CtOption<AffinePoint> {
        // secret_key = private_key * other_public_key
        let is_other_pub_on_curve = self.is_on_curve_affine(other_public_key);
        if !bool::from(is_other_pub_on_curve) {
            return CtOption::new(self.generator.clone(), Choice::from(0));
        }

        let monty = self.monty_knowledge();
        let other_pub = Self::internal_affine_to_monty_projective(&monty, other_public_key);
        let product = Self::internal_multiply_scalar_with_point(&monty, private_key, &other_pub);
        Self::internal_monty_projective_to_affine(&product)
    }

    /// Derives the curve with the mapped generator `G' = nonce * G + shared_point`.
    ///
    /// Returns `None` if the mapped generator is the point at infinity.
    pub fn derive_generic_mapping_session_curve(&self, nonce: &BoxedUint, shared_point: &AffinePoint) -> Option<Self> {
        let monty = self.monty_knowledge();
        let generator_proj = Self::internal_affine_to_monty_projective(&monty, &self.generator);
        let shared_point_proj = Self::internal_affine_to_monty_projective(&monty, shared_point);

        let product = Self::internal_multiply_scalar_with_point(&monty, nonce, &generator_proj);
        let sum = Self::internal_add_points(&monty, &product, &shared_point_proj);

        let new_generator: Option<AffinePoint> = Self::internal_monty_projective_to_affine(&sum).into();
        Some(Self {
            prime: self.prime.clone(),
            coefficient_a: self.coefficient_a.clone(),
            coefficient_b: self.coefficient_b.clone(),
            generator: new_generator?,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::{AffinePoint, PointError};
    use crate::crypt::boxed_uint_from_be_slice;
    use crate::crypt::elliptic::curves::brainpool_p256r1;
    use hex_literal::hex;

    #[test]
    fn icao_doc9303_part11_secg1_example() {
        let curve = brainpool_p256r1();

        // obtain nonce
        let nonce = boxed_uint_from_be_slice(&hex!("
            3F00C4D3 9D153F2B 2A214A07 8D899B22
        "));

        // perform key agreement for the mapping
        let terminal_private = boxed_uint_from_be_slice(&hex!("
            7F4EF07B 9EA82FD7 8AD689B3 8D0BC78C
            F21F249D 953BC46F 4C6E1925 9C010F99
        "));
        let chip_private = boxed_uint_from_be_slice(&hex!("
            498FF497 56F2DC15 87840041 839A8598
            2BE7761D 14715FB0 91EFA7BC E9058560
        "));

        let terminal_public = curve.calculate_public_key(&terminal_private).unwrap();
        let chip_public = curve.calculate_public_key(&chip_private).unwrap();

        assert_eq!(
            terminal_public.x(),
            &boxed_uint_from_be_slice(&hex!("
                7ACF3EFC 982EC455 65A4B155 129EFBC7
                4650DCBF A6362D89 6FC70262 E0C2CC5E
            ")),
        );
        assert_eq!(
            chip_public.y(),
            &boxed_uint_from_be_slice(&hex!("
                30D8C879 AAA9C9F7 3991E61B 58F4D52E
                B87A0A0C 709A49DC 63719363 CCD13C54
            ")),
        );

        let terminal_secret = curve.diffie_hellman(&terminal_private, &chip_public).unwrap();
        let chip_secret = curve.diffie_hellman(&chip_private, &terminal_public).unwrap();
        let shared_point = AffinePoint::new(
            boxed_uint_from_be_slice(&hex!("
                60332EF2 450B5D24 7EF6D386 8397D398
                852ED6E8 CAF6FFEE F6BF85CA 57057FD5
            ")),
            boxed_uint_from_be_slice(&hex!("
                0840CA74 15BAF3E4 3BD414D3 5AA4608B
                93A2CAF3 A4E3EA4E 82C9C13D 03EB7181
            ")),
        );
        assert_eq!(terminal_secret, chip_secret);
        assert_eq!(terminal_secret, shared_point);

        // map a new generator
        let session_curve = curve.derive_generic_mapping_session_curve(&nonce, &shared_point).unwrap();
        assert_eq!(
            session_curve.generator().x(),
            &boxed_uint_from_be_slice(&hex!("
                8CED63C9 1426D4F0 EB1435E7 CB1D74A4
                6723A0AF 21C89634 F65A9AE8 7A9265E2
            ")),
        );
        assert_eq!(
            session_curve.generator().y(),
            &boxed_uint_from_be_slice(&hex!("
                8C879506 743F8611 AC33645C 5B985C80
                B5F09A0B 83407C1B 6A4D857A E76FE522
            ")),
        );

        let session_terminal_private = boxed_uint_from_be_slice(&hex!("
            A73FB703 AC1436A1 8E0CFA5A BB3F7BEC
            7A070E7A 6788486B EE230C4A 22762595
        "));
        let session_chip_private = boxed_uint_from_be_slice(&hex!("
            107CF586 96EF6155 053340FD 633392BA
            81909DF7 B9706F22 6F32086C 7AFF974A
        "));

        let session_terminal_public = session_curve.calculate_public_key(&session_terminal_private).unwrap();
        let session_chip_public = session_curve.calculate_public_key(&session_chip_private).unwrap();

        assert_eq!(
            session_chip_public.x(),
            &boxed_uint_from_be_slice(&hex!("
                9E880F84 2905B8B3 181F7AF7 CAA9F0EF
                B743847F 44A306D2 D28C1D9E C65DF6DB
            ")),
        );

        let session_terminal_secret = session_curve.diffie_hellman(&session_terminal_private, &session_chip_public).unwrap();
        let session_chip_secret = session_curve.diffie_hellman(&session_chip_private, &session_terminal_public).unwrap();
        let session_shared_secret = boxed_uint_from_be_slice(&hex!("
            28768D20 701247DA E81804C9 E780EDE5
            82A9996D B4A31502 0B273319 7DB84925
        "));
        assert_eq!(session_terminal_secret.x(), &session_shared_secret);
        assert_eq!(session_chip_secret.x(), &session_shared_secret);
    }

    #[test]
    fn test_decode_card_point() {
        let curve = brainpool_p256r1();
        let encoded = hex!("
            04
            4E2778F6 AAEF54CB 42865A3C 30C75349 5AF4E531 21400802 D0AB1ACD 665E9C77
            4C2FAE16 87E9DAA3 6C64570C 909F9317 6F01EEAF CB45F9C0 8E49805F 127D94EF
        ");
        let point = curve.decode_point(&encoded).unwrap();
        assert_eq!(
            point.x(),
            &boxed_uint_from_be_slice(&hex!("4E2778F6 AAEF54CB 42865A3C 30C75349 5AF4E531 21400802 D0AB1ACD 665E9C77")),
        );
        assert_eq!(
            point.y(),
            &boxed_uint_from_be_slice(&hex!("4C2FAE16 87E9DAA3 6C64570C 909F9317 6F01EEAF CB45F9C0 8E49805F 127D94EF")),
        );
        assert_eq!(curve.encode_point(&point).as_slice(), &encoded[..]);
    }

    #[test]
    fn test_encode_pads_short_coordinates() {
        let curve = brainpool_p256r1();
        let point = AffinePoint::new(
            boxed_uint_from_be_slice(&hex!("0102")),
            boxed_uint_from_be_slice(&hex!("03")),
        );
        let encoded = curve.encode_point(&point);
        assert_eq!(encoded.len(), 65);
        assert_eq!(encoded[0], 0x04);
        assert_eq!(&encoded[31..33], &[0x01, 0x02]);
        assert_eq!(encoded[64], 0x03);
        assert!(encoded[1..31].iter().all(|b| *b == 0x00));

        let decoded = curve.decode_point(&encoded).unwrap();
        assert_eq!(curve.encode_point(&decoded), encoded);
    }

    #[test]
    fn test_scalar_precision_does_not_change_product() {
        let curve = brainpool_p256r1();
        let narrow = boxed_uint_from_be_slice(&hex!("2A"));
        let mut wide_bytes = [0u8; 32];
        wide_bytes[31] = 0x2A;
        let wide = boxed_uint_from_be_slice(&wide_bytes);
        assert_eq!(wide.bits_precision(), 256);

        let narrow_public = curve.calculate_public_key(&narrow).unwrap();
        let wide_public = curve.calculate_public_key(&wide).unwrap();
        assert_eq!(narrow_public, wide_public);

        let one = boxed_uint_from_be_slice(&hex!("0000000000000001"));
        assert_eq!(&curve.calculate_public_key(&one).unwrap(), curve.generator());
    }

    #[test]
    fn test_decode_rejects_bad_encodings() {
        let curve = brainpool_p256r1();
        let generator = curve.encode_point(curve.generator());

        let mut compressed = generator.to_vec();
        compressed[0] = 0x02;
        assert_eq!(
            curve.decode_point(&compressed),
            Err(PointError::NotUncompressed { first_byte: Some(0x02) }),
        );
        assert_eq!(
            curve.decode_point(&[]),
            Err(PointError::NotUncompressed { first_byte: None }),
        );
        assert_eq!(
            curve.decode_point(&generator[..64]),
            Err(PointError::Length { expected: 65, obtained: 64 }),
        );
    }

    #[test]
    fn test_off_curve_points_are_rejected() {
        let curve = brainpool_p256r1();
        assert!(bool::from(curve.is_on_curve_affine(curve.generator())));

        let mut tampered = curve.encode_point(curve.generator()).to_vec();
        tampered[64] ^= 0x01;
        let tampered_point = curve.decode_point(&tampered).unwrap();
        assert!(!bool::from(curve.is_on_curve_affine(&tampered_point)));

        let private_key = boxed_uint_from_be_slice(&hex!("2A"));
        assert!(bool::from(curve.diffie_hellman(&private_key, &tampered_point).is_none()));

        // x = p is outside of the field
        let mut out_of_field = vec![0x04];
        out_of_field.extend(&hex!("A9FB57DB A1EEA9BC 3E660A90 9D838D72 6E3BF623 D5262028 2013481D 1F6E5377"));
        out_of_field.extend(&[0u8; 32]);
        let out_of_field_point = curve.decode_point(&out_of_field).unwrap();
        assert!(!bool::from(curve.is_on_curve_affine(&out_of_field_point)));
    }

    #[test]
    fn test_zero_scalar_gives_no_public_key() {
        let curve = brainpool_p256r1();
        let zero = boxed_uint_from_be_slice(&[0x00]);
        assert!(bool::from(curve.calculate_public_key(&zero).is_none()));
    }
}
