use terrain_mosaic::{geo::MAX_LATITUDE, Encoding, OutputFormat};

pub fn is_numeric_min(min: usize) -> impl Fn(String) -> Result<(), String> {
    move |v: String| {
        let val = v
            .parse::<usize>()
            .map_err(|_| "must be numeric".to_owned())?;

        if val < min {
            return Err(format!("must be >= {}", min));
        }

        Ok(())
    }
}

pub fn is_latitude(v: String) -> Result<(), String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if val.abs() > MAX_LATITUDE {
        return Err(format!("must be within ±{:.4}°", MAX_LATITUDE));
    }

    Ok(())
}

pub fn is_longitude(v: String) -> Result<(), String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if val < -180f64 {
        return Err("must be >= -180°".to_owned());
    } else if val > 180f64 {
        return Err("must be <= 180°".to_owned());
    }

    Ok(())
}

pub fn is_encoding(v: String) -> Result<(), String> {
    v.parse::<Encoding>()
        .map(|_| ())
        .map_err(|_| "must be terrain-rgb or terrarium".to_owned())
}

pub fn is_output_format(v: String) -> Result<(), String> {
    v.parse::<OutputFormat>()
        .map(|_| ())
        .map_err(|_| "must be row-records or pixel-records".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates() {
        assert!(is_latitude("40.0".to_owned()).is_ok());
        assert!(is_latitude("-85".to_owned()).is_ok());
        assert!(is_latitude("89".to_owned()).is_err());
        assert!(is_longitude("-180".to_owned()).is_ok());
        assert!(is_longitude("181".to_owned()).is_err());
        assert!(is_longitude("east".to_owned()).is_err());
    }

    #[test]
    fn numeric_min() {
        assert!(is_numeric_min(1)("3".to_owned()).is_ok());
        assert!(is_numeric_min(1)("0".to_owned()).is_err());
        assert!(is_numeric_min(0)("-1".to_owned()).is_err());
    }
}
