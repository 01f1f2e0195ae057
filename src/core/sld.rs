//! Fixes up the SLD written by `r.colors.out_sld` before GeoServer sees it.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// First element mentioning NaN, e.g. a `ColorMapEntry` for null cells.
    static ref NAN_ENTRY: Regex = Regex::new(r"<[^\n]*?NaN[^\n]*?>").unwrap();
    static ref COLOR_MAP_OPEN: Regex = Regex::new(r"<((?:[A-Za-z]+:)?)ColorMap>\n").unwrap();
}

/// Entry making cells with value 0 transparent.
pub const NODATA_ENTRY: &str = r##"<ColorMapEntry color="#000000" opacity="0" quantity="0"/>"##;

/// Drop the first NaN entry (GeoServer rejects it) and, when `add_nodata`,
/// render 0 as transparent.
pub fn prepare_style(sld: &str, add_nodata: bool) -> String {
    let mut style = match NAN_ENTRY.find(sld) {
        Some(m) => sld.replace(&format!("{}\n", m.as_str()), ""),
        None => sld.to_owned(),
    };
    if add_nodata {
        style = COLOR_MAP_OPEN
            .replace_all(&style, |caps: &regex::Captures| {
                let prefix = &caps[1];
                format!(
                    "{}\n{}\n",
                    &caps[0][..caps[0].len() - 1],
                    NODATA_ENTRY.replacen("<", &format!("<{}", prefix), 1)
                )
            })
            .into_owned();
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLD: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<StyledLayerDescriptor version=\"1.0.0\">\n\
<NamedLayer>\n\
<UserStyle>\n\
<FeatureTypeStyle>\n\
<Rule>\n\
<RasterSymbolizer>\n\
<ColorMap>\n\
<ColorMapEntry color=\"#000000\" quantity=\"NaN\" opacity=\"0\"/>\n\
<ColorMapEntry color=\"#00bfbf\" quantity=\"55.5788\"/>\n\
<ColorMapEntry color=\"#141414\" quantity=\"156.33\"/>\n\
</ColorMap>\n\
</RasterSymbolizer>\n\
</Rule>\n\
</FeatureTypeStyle>\n\
</UserStyle>\n\
</NamedLayer>\n\
</StyledLayerDescriptor>\n";

    #[test]
    fn test_removes_nan_and_adds_nodata() {
        let style = prepare_style(SLD, true);
        assert!(!style.contains("NaN"));
        assert!(style.contains(
            "<ColorMap>\n<ColorMapEntry color=\"#000000\" opacity=\"0\" quantity=\"0\"/>\n<ColorMapEntry color=\"#00bfbf\""
        ));
    }

    #[test]
    fn test_without_nodata() {
        let style = prepare_style(SLD, false);
        assert!(!style.contains("NaN"));
        assert!(!style.contains("quantity=\"0\""));
        assert!(style.contains("<ColorMap>\n<ColorMapEntry color=\"#00bfbf\""));
    }

    #[test]
    fn test_prefixed_color_map() {
        let sld = "<sld:ColorMap>\n<sld:ColorMapEntry color=\"#ff0000\" quantity=\"1\"/>\n</sld:ColorMap>\n";
        let style = prepare_style(sld, true);
        assert_eq!(
            style,
            "<sld:ColorMap>\n<sld:ColorMapEntry color=\"#000000\" opacity=\"0\" quantity=\"0\"/>\n<sld:ColorMapEntry color=\"#ff0000\" quantity=\"1\"/>\n</sld:ColorMap>\n"
        );
    }

    #[test]
    fn test_untouched_without_nan() {
        let sld = "<ColorMap>\n<ColorMapEntry color=\"#ff0000\" quantity=\"1\"/>\n</ColorMap>\n";
        assert_eq!(prepare_style(sld, false), sld);
    }
}
