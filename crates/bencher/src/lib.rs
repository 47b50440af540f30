#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, file: TestFile) -> Self {
        Self { name, group, file }
    }

    pub fn small(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Small, file)
    }

    pub fn large(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Large, file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn file_name(&self) -> &'static str {
        self.file().file_name
    }

    /// Parameter string for a benchmark id, e.g. `small/small.txt`.
    pub fn parameter(&self) -> String {
        format!("{}/{}", self.group().as_str(), self.file_name())
    }

    /// The fixture split into header lines, the way an engine reports them.
    pub fn lines(&self) -> Vec<&'static str> {
        self.file.content().lines().collect()
    }
}

/// A captured response header block.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Large,
}

impl TestGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            TestGroup::Small => "small",
            TestGroup::Large => "large",
        }
    }
}

pub static SMALL_HEADERS: TestFile = TestFile::new("small.txt", include_str!("../resources/headers/small.txt"));
pub static LARGE_HEADERS: TestFile = TestFile::new("large.txt", include_str!("../resources/headers/large.txt"));

pub fn header_cases() -> Vec<TestCase> {
    vec![TestCase::small("small_headers", SMALL_HEADERS), TestCase::large("large_headers", LARGE_HEADERS)]
}
