use xxhash_rust::xxh3::xxh3_128;

use crate::models::ObsIdentity;
use crate::utils::rounding::scale_coordinate;

/// Derives the stable 128-bit identity key for an observation.
///
/// The key is xxh3_128 over a fixed-layout encoding of the seven identity
/// fields in the order {fcst_dttm, valid_dttm, station_id, parameter, level,
/// scaled_lon, scaled_lat}: integers as 8-byte little-endian, the parameter
/// as a 4-byte little-endian length prefix followed by its UTF-8 bytes.
/// xxh3 is platform-independent, so equal inputs produce equal keys in every
/// process and on every host.
#[derive(Debug, Clone, Copy)]
pub struct KeyBuilder {
    round_decimals: u32,
}

impl KeyBuilder {
    pub fn new(round_decimals: u32) -> Self {
        Self { round_decimals }
    }

    pub fn round_decimals(&self) -> u32 {
        self.round_decimals
    }

    pub fn observation_key(&self, id: &ObsIdentity) -> u128 {
        let scaled_lon = scale_coordinate(id.lon, self.round_decimals);
        let scaled_lat = scale_coordinate(id.lat, self.round_decimals);

        let mut buf = Vec::with_capacity(52 + id.parameter.len());
        buf.extend_from_slice(&id.fcst_dttm.to_le_bytes());
        buf.extend_from_slice(&id.valid_dttm.to_le_bytes());
        buf.extend_from_slice(&id.station_id.to_le_bytes());
        buf.extend_from_slice(&(id.parameter.len() as u32).to_le_bytes());
        buf.extend_from_slice(id.parameter.as_bytes());
        buf.extend_from_slice(&id.level.to_le_bytes());
        buf.extend_from_slice(&scaled_lon.to_le_bytes());
        buf.extend_from_slice(&scaled_lat.to_le_bytes());

        xxh3_128(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> ObsIdentity {
        ObsIdentity {
            fcst_dttm: 2023071500,
            valid_dttm: 2023071512,
            station_id: 1492,
            parameter: "t".to_string(),
            level: 85000,
            lon: 10.7231,
            lat: 59.9423,
        }
    }

    #[test]
    fn test_identical_inputs_yield_identical_keys() {
        let builder = KeyBuilder::new(2);
        let other_builder = KeyBuilder::new(2);
        let id = sample_identity();
        assert_eq!(builder.observation_key(&id), builder.observation_key(&id));
        assert_eq!(
            builder.observation_key(&id),
            other_builder.observation_key(&id)
        );
    }

    #[test]
    fn test_every_identity_field_participates() {
        let builder = KeyBuilder::new(2);
        let base = sample_identity();
        let base_key = builder.observation_key(&base);

        let variants = [
            ObsIdentity {
                fcst_dttm: 2023071506,
                ..base.clone()
            },
            ObsIdentity {
                valid_dttm: 2023071518,
                ..base.clone()
            },
            ObsIdentity {
                station_id: 1493,
                ..base.clone()
            },
            ObsIdentity {
                parameter: "rh".to_string(),
                ..base.clone()
            },
            ObsIdentity {
                level: 50000,
                ..base.clone()
            },
            ObsIdentity {
                lon: 11.7231,
                ..base.clone()
            },
            ObsIdentity {
                lat: 58.9423,
                ..base.clone()
            },
        ];
        for variant in variants {
            assert_ne!(builder.observation_key(&variant), base_key);
        }
    }

    #[test]
    fn test_coordinates_below_rounding_precision_collapse() {
        let builder = KeyBuilder::new(2);
        let a = sample_identity();
        let b = ObsIdentity {
            lon: 10.7249, // same at two decimals after rounding
            ..a.clone()
        };
        assert_eq!(
            scale_coordinate(a.lon, 2),
            scale_coordinate(b.lon, 2)
        );
        assert_eq!(builder.observation_key(&a), builder.observation_key(&b));
    }

    #[test]
    fn test_rounding_decimals_change_the_key() {
        let id = sample_identity();
        let at_two = KeyBuilder::new(2).observation_key(&id);
        let at_three = KeyBuilder::new(3).observation_key(&id);
        assert_ne!(at_two, at_three);
    }
}
