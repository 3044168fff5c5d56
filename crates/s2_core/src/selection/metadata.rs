use thiserror::Error;

/// Element of the product metadata holding the cloud percentage.
pub const CLOUD_COVER_ELEMENT: &str = "Cloud_Coverage_Assessment";

#[derive(Debug, Error, PartialEq)]
pub enum MetadataError {
    #[error("metadata is not valid UTF-8")]
    Encoding,
    #[error("metadata is not well-formed XML: {0}")]
    Xml(String),
    #[error("metadata has no {CLOUD_COVER_ELEMENT} element")]
    MissingCloudCover,
    #[error("unparseable cloud cover value {0:?}")]
    InvalidCloudCover(String),
}

/// Extract the cloud-cover percentage (0-100) from a product metadata document.
pub fn parse_cloud_cover(document: &[u8]) -> Result<f64, MetadataError> {
    let text = std::str::from_utf8(document).map_err(|_| MetadataError::Encoding)?;
    let doc = roxmltree::Document::parse(text).map_err(|err| MetadataError::Xml(err.to_string()))?;
    let node = doc
        .descendants()
        .find(|node| node.has_tag_name(CLOUD_COVER_ELEMENT))
        .ok_or(MetadataError::MissingCloudCover)?;
    let raw = node.text().unwrap_or_default().trim();
    let value: f64 = raw
        .parse()
        .map_err(|_| MetadataError::InvalidCloudCover(raw.to_string()))?;
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(MetadataError::InvalidCloudCover(raw.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_namespaced_cloud_cover() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-1C_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/User_Product_Level-1C.xsd">
  <n1:Quality_Indicators_Info>
    <Cloud_Coverage_Assessment>12.3456</Cloud_Coverage_Assessment>
  </n1:Quality_Indicators_Info>
</n1:Level-1C_User_Product>"#;
        assert_eq!(parse_cloud_cover(xml), Ok(12.3456));
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(matches!(parse_cloud_cover(b"<a><b></a>"), Err(MetadataError::Xml(_))));
        assert_eq!(
            parse_cloud_cover(b"<a/>"),
            Err(MetadataError::MissingCloudCover)
        );
        assert_eq!(
            parse_cloud_cover(b"<a><Cloud_Coverage_Assessment>n/a</Cloud_Coverage_Assessment></a>"),
            Err(MetadataError::InvalidCloudCover("n/a".to_string()))
        );
        assert!(parse_cloud_cover(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_cloud_cover(
            b"<a><Cloud_Coverage_Assessment>101</Cloud_Coverage_Assessment></a>"
        )
        .is_err());
    }
}
