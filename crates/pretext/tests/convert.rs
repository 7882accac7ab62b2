use once_cell::sync::Lazy;
use qmdptx_core::{ConvertWarning, StructuralError};
use qmdptx_pretext::{
    AssetRequest, BatchInput, BatchOptions, ConvertConfig, ConvertError, Converter, convert,
    convert_batch, convert_with_exercises,
};

static CONFIG: Lazy<ConvertConfig> = Lazy::new(ConvertConfig::default);

fn xml(source: &str) -> String {
    convert(source, &CONFIG).expect("conversion should succeed").xml
}

#[test]
fn section_with_inline_markup() {
    let source = "# Summaries\n\n## Overview {#sec-a}\n\nSome *text* and $x^2$.\n";
    insta::assert_snapshot!(xml(source).trim_end(), @r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <chapter xml:id="summaries" xmlns:xi="http://www.w3.org/2001/XInclude">
      <title>Summaries</title>
      <section xml:id="sec-a">
        <title>Overview</title>
        <p>Some <em>text</em> and <m>x^2</m>.</p>
      </section>
    </chapter>
    "#);
}

#[test]
fn guided_practice_with_solution() {
    let source = "\
# Proportions

## Practice {#sec-practice}

::: {.guidedpractice}
Is $\\hat{p}$ unbiased?

::: {.callout-note collapse=\"true\"}
## Solution
Yes, see @sec-practice.
:::
:::
";
    insta::assert_snapshot!(xml(source).trim_end(), @r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <chapter xml:id="proportions" xmlns:xi="http://www.w3.org/2001/XInclude">
      <title>Proportions</title>
      <section xml:id="sec-practice">
        <title>Practice</title>
        <exercise xml:id="exercise-1">
          <statement>
            <p>Is <m>\hat{p}</m> unbiased?</p>
          </statement>
          <solution>
            <p>Yes, see <xref ref="sec-practice"/>.</p>
          </solution>
        </exercise>
      </section>
    </chapter>
    "#);
}

#[test]
fn multi_panel_figure() {
    let source = "\
# Figures

## Plots

```{r}
#| label: fig-x
#| fig-cap: Two views of the data.
#| fig-subcap:
#|   - Left view
#|   - Right view
#| layout-ncol: 2
plot(x)
plot(y)
```
";
    let conversion = convert(source, &CONFIG).expect("conversion should succeed");
    insta::assert_snapshot!(conversion.xml.trim_end(), @r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <chapter xml:id="figures" xmlns:xi="http://www.w3.org/2001/XInclude">
      <title>Figures</title>
      <section xml:id="plots">
        <title>Plots</title>
        <figure xml:id="fig-x">
          <caption>Two views of the data.</caption>
          <sidebyside widths="45% 45%">
            <figure xml:id="fig-x-1">
              <caption>Left view</caption>
              <image source="images/fig-x-1.png" width="90%"/>
            </figure>
            <figure xml:id="fig-x-2">
              <caption>Right view</caption>
              <image source="images/fig-x-2.png" width="90%"/>
            </figure>
          </sidebyside>
        </figure>
      </section>
    </chapter>
    "#);

    let images: Vec<_> = conversion
        .assets
        .iter()
        .map(|asset| match asset {
            AssetRequest::Image { path, .. } => path.as_str(),
            AssetRequest::TableBody { path, .. } => panic!("unexpected table body {path}"),
        })
        .collect();
    assert_eq!(images, vec!["images/fig-x-1.png", "images/fig-x-2.png"]);
}

#[test]
fn introduction_lists_and_listing() {
    let source = "\
# Tools

Intro with a footnote^[See <https://openintro.org>.] and `code`.

- first item
- second **bold** item
    1. nested one

```{r}
#| label: lst-setup
library(dplyr)
if (x < 3 && y > 1) z
```
";
    insta::assert_snapshot!(xml(source).trim_end(), @r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <chapter xml:id="tools" xmlns:xi="http://www.w3.org/2001/XInclude">
      <title>Tools</title>
      <introduction>
        <p>Intro with a footnote<fn>See <url href="https://openintro.org"/>.</fn> and <c>code</c>.</p>
        <p>
          <ul>
            <li>
              <p>first item</p>
            </li>
            <li>
              <p>second <alert>bold</alert> item</p>
              <p>
                <ol>
                  <li>
                    <p>nested one</p>
                  </li>
                </ol>
              </p>
            </li>
          </ul>
        </p>
        <listing xml:id="lst-setup">
          <program language="r">
            <input>
    library(dplyr)
    if (x &lt; 3 &amp;&amp; y &gt; 1) z
            </input>
          </program>
        </listing>
      </introduction>
    </chapter>
    "#);
}

#[test]
fn duplicate_explicit_id_produces_no_output() {
    let source = "## A {#sec-dup}\n\n## B {#sec-dup}\n";
    let err = convert(source, &CONFIG).unwrap_err();
    assert!(matches!(err, ConvertError::DuplicateId { ref id, .. } if id == "sec-dup"));
}

#[test]
fn unclosed_exercise_names_the_block() {
    let source = "# Ch\n\n::: {.guidedpractice}\nNever closed.\n";
    let err = convert(source, &CONFIG).unwrap_err();
    match &err {
        ConvertError::Structural(StructuralError::UnclosedBlock { kind, .. }) => {
            assert_eq!(kind, "exercise");
        }
        other => panic!("expected an unclosed block, got {other:?}"),
    }
    assert!(err.to_string().contains("exercise"));
}

#[test]
fn unresolved_reference_is_a_single_warning() {
    let source = "# Ch\n\n## A {#sec-a}\n\nSee @sec-a and @fig-missing.\n";
    let conversion = convert(source, &CONFIG).expect("conversion should succeed");
    assert_eq!(conversion.warnings.len(), 1);
    assert!(matches!(
        &conversion.warnings[0],
        ConvertWarning::UnresolvedReference { target, .. } if target == "fig-missing"
    ));
    assert!(conversion.xml.contains("<xref ref=\"fig-missing\"/>"));
}

#[test]
fn conversion_is_deterministic() {
    let source = "\
# Repeat

::: {.workedexample}
### Bootstrapping
Resample $n$ times.
:::

```{r}
#| label: tbl-loans
#| tbl-cap: Loan amounts.
kable(loans)
```
";
    let first = convert(source, &CONFIG).expect("conversion should succeed");
    let second = convert(source, &CONFIG).expect("conversion should succeed");
    assert_eq!(first, second);
}

#[test]
fn exercise_document_is_merged() {
    let chapter = "# Inference {#ch-inf}\n\n## Bootstrap\n\nSee @exr-2.\n";
    let exercises = "\
1. **Coin flips.** Is the coin fair?

2. Compute the interval.

    a. At 90%.
    b. At 95%.
";
    let conversion =
        convert_with_exercises(chapter, exercises, &CONFIG).expect("conversion should succeed");
    assert!(conversion.warnings.is_empty(), "{:?}", conversion.warning_messages());
    insta::assert_snapshot!(conversion.xml.trim_end(), @r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <chapter xml:id="ch-inf" xmlns:xi="http://www.w3.org/2001/XInclude">
      <title>Inference</title>
      <section xml:id="bootstrap">
        <title>Bootstrap</title>
        <p>See <xref ref="exr-2"/>.</p>
      </section>
      <exercises xml:id="ch-inf-exercises">
        <title>Exercises</title>
        <exercise xml:id="exr-1">
          <title>Coin flips</title>
          <statement>
            <p>Is the coin fair?</p>
          </statement>
        </exercise>
        <exercise xml:id="exr-2">
          <statement>
            <p>Compute the interval.</p>
            <p>
              <ol marker="a.">
                <li>
                  <p>At 90%.</p>
                </li>
                <li>
                  <p>At 95%.</p>
                </li>
              </ol>
            </p>
          </statement>
        </exercise>
      </exercises>
    </chapter>
    "#);
}

#[test]
fn exercise_file_locations_are_reported() {
    let err = Converter::new(&CONFIG)
        .with_file("ch05.qmd")
        .with_exercises_file("ch05-exercises.qmd")
        .convert("# Ch\n", Some("```{r}\nx\n"))
        .unwrap_err();
    assert!(err.to_string().contains("ch05-exercises.qmd:1:1"), "{err}");
}

#[test]
fn yaml_config_changes_output() {
    let config = ConvertConfig::from_yaml_str(
        "\
imageDir: figures
figureWidth: 50%
citationPrefix: biblio-
knownCitations: [efron1993]
",
    )
    .expect("config should load");
    let source = "\
# Config

```{r}
#| label: fig-hist
#| fig-cap: A histogram [@efron1993].
#| fig-alt: Right-skewed histogram.
hist(x)
```
";
    let conversion = convert(source, &config).expect("conversion should succeed");
    assert!(conversion.warnings.is_empty());
    assert!(conversion.xml.contains("<caption>A histogram <xref ref=\"biblio-efron1993\"/>.</caption>"));
    assert!(conversion.xml.contains("<image source=\"figures/fig-hist-1.png\" width=\"50%\">"));
    assert!(conversion.xml.contains("<shortdescription>Right-skewed histogram.</shortdescription>"));
}

#[test]
fn batch_converts_every_chapter() {
    let inputs = vec![
        BatchInput::new("ch01.qmd", "# One\n"),
        BatchInput {
            id: "ch02.qmd".into(),
            source: "# Two {#ch-two}\n".into(),
            exercises: Some("1. Q.\n".into()),
        },
    ];
    let result = convert_batch(inputs, &BatchOptions::default(), &CONFIG);
    assert_eq!(result.stats.succeeded, 2);
    let second = result.results[1].result.as_ref().expect("second chapter converts");
    assert!(second.xml.contains("<exercises xml:id=\"ch-two-exercises\">"));
}

#[test]
fn derived_ids_in_both_documents_do_not_collide() {
    let chapter = "# Ch\n\n## Practice\n\n::: {.guidedpractice}\nWhy?\n:::\n";
    let exercises = "1. First.\n\n::: {.guidedpractice}\nAnd why not?\n:::\n";
    let conversion =
        convert_with_exercises(chapter, exercises, &CONFIG).expect("conversion should succeed");
    assert!(conversion.xml.contains("<exercise xml:id=\"exercise-1\">"));
    assert!(conversion.xml.contains("<exercise xml:id=\"exr-1\">"));
    assert!(conversion.xml.contains("<exercise xml:id=\"exercise-1-2\">"));
}

#[test]
fn explicit_id_repeated_in_exercise_document_fails() {
    let chapter = "# Ch\n\n## Practice {#sec-practice}\n";
    let exercises = "## Practice {#sec-practice}\n\n1. First.\n";
    let err = convert_with_exercises(chapter, exercises, &CONFIG).unwrap_err();
    assert!(matches!(err, ConvertError::DuplicateId { ref id, .. } if id == "sec-practice"));
}
